pub mod api;
pub mod chat;
pub mod domain;
pub mod ports;
pub mod request;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

pub use api::lessons::{Lesson, LessonGenerateParams, LessonVersion};
pub use api::plans::{Plan, PlanGenerateParams, PlanVersion};
pub use api::profiles::Profile;
pub use api::{ChatApi, LessonApi, PlanApi, ProfileApi, SaveResponse};
pub use chat::ChatStore;
pub use domain::{
    AnalyzeResponse, ChatMessage, ChatResponse, ChatRole, Claims, SaveStatus, Session, User,
    VersionList,
};
pub use ports::{
    AuthorizationRequest, CallbackError, CallbackParams, HttpRequest, HttpResponse, HttpTransport,
    IdentityProvider, Method, Navigation, Navigator, PortError, PortResult,
};
pub use request::ApiClient;
pub use session::{SessionManager, SessionSettings};
pub use store::{Consistency, Resource, ResourceStore, SaveMode};

/// Store aliases for the three synchronized resource families.
pub type LessonStore = ResourceStore<LessonApi>;
pub type PlanStore = ResourceStore<PlanApi>;
pub type ProfileStore = ResourceStore<ProfileApi>;
