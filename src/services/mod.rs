//! Services layer - Business logic
//!
//! Services implement the rules of the blog on top of the repositories:
//! - accounts, tokens and external logins
//! - posts, images and comments, including sanitizing and moderation
//! - outgoing email and file storage

pub mod account;
pub mod blogg;
pub mod censorship;
pub mod comment;
pub mod content;
pub mod content_safety;
pub mod email;
pub mod google;
pub mod images;
pub mod jwt;
pub mod likes;
pub mod notifier;
pub mod password;
pub mod role;
pub mod sanitizer;
pub mod seeder;
pub mod storage;
pub mod user_admin;

pub use account::{AccountError, AccountService, AccountSettings, BasicResult};
pub use blogg::{BloggService, BloggServiceError};
pub use comment::{CommentActor, CommentService, CommentServiceError};
pub use content::{AboutMeService, ContactMeService, ContentServiceError, ForbiddenWordService};
pub use content_safety::ContentSafetyService;
pub use email::{create_email_sender, EmailSender};
pub use google::{ExternalIdentityProvider, GoogleProvider};
pub use images::{ImageService, ImageServiceError, UploadedFile};
pub use jwt::{Claims, LoginResponse, TokenService};
pub use likes::{LikeService, LikeServiceError};
pub use notifier::NewPostNotifier;
pub use password::{hash_password, verify_password};
pub use role::{RoleService, RoleServiceError};
pub use storage::{create_storage, FileStorage};
pub use user_admin::{UserAdminError, UserAdminService};
