pub mod components;
pub mod domain;
pub mod entities;
pub mod service;

pub use components::app::AppComponents;
pub use service::SocialContext;

fn generate_uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}
