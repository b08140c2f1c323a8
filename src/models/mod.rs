//! Data models
//!
//! This module contains the data structures used throughout the SarasBlogg API:
//! - Database entities (User, Blogg, BloggImage, Comment, BloggLike, ForbiddenWord, AboutMe, ContactMe)
//! - API request/response types
//! - Roles and authorization policies

mod blogg;
mod comment;
mod content;
mod like;
mod personal_data;
mod user;

pub use blogg::{Blogg, BloggImage, BloggInput, ImageOrderEntry};
pub use comment::{Comment, CommentAuthor, CommentDto, CommentInput};
pub use content::{
    looks_like_email, AboutMe, ContactMe, ContactMeInput, ForbiddenWord, ForbiddenWordInput,
};
pub use like::{BloggLike, LikeDto};
pub use personal_data::{CommentPreview, LikePreview, PersonalData};
pub use user::{
    ExternalLogin, NewUser, Policy, ProfileUpdate, RefreshToken, Role, TokenPurpose, User,
    UserDto, UserToken,
};
