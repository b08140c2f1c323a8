//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity.

pub mod about_me;
pub mod blogg;
pub mod blogg_image;
pub mod comment;
pub mod contact_me;
pub mod forbidden_word;
pub mod like;
pub mod role;
pub mod token;
pub mod user;

pub use about_me::{AboutMeRepository, SqlxAboutMeRepository};
pub use blogg::{BloggRepository, SqlxBloggRepository};
pub use blogg_image::{BloggImageRepository, SqlxBloggImageRepository};
pub use comment::{CommentRepository, NewComment, SqlxCommentRepository};
pub use contact_me::{ContactMeRepository, SqlxContactMeRepository};
pub use forbidden_word::{ForbiddenWordRepository, SqlxForbiddenWordRepository};
pub use like::{LikeRepository, SqlxLikeRepository};
pub use role::{RoleRepository, SqlxRoleRepository};
pub use token::{SqlxTokenRepository, TokenRepository};
pub use user::{SqlxUserRepository, UserRepository};
