pub mod http;
pub mod navigator;
pub mod oidc;

pub use http::ReqwestTransport;
pub use navigator::ConsoleNavigator;
pub use oidc::{callback_params, CognitoOidcAdapter, CognitoSettings};
