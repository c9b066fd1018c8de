use std::sync::Arc;

use super::{
    backend::{Backend, RestBackend},
    configuration::Config,
    health::HealthComponent,
    notifier::{LogNotifier, Notifier},
    realtime::{ChangeFeed, RealtimeComponent},
    session::{AuthContext, SessionComponent},
};
use crate::{domain::error::CommonError, service::SocialContext};

pub struct AppComponents {
    pub config: Config,
    pub session: AuthContext,
    pub backend: Arc<dyn Backend>,
    pub change_feed: Arc<dyn ChangeFeed>,
    pub notifier: Arc<dyn Notifier>,
    pub health: HealthComponent,
}

impl std::fmt::Debug for AppComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppComponents")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("health", &self.health)
            .finish()
    }
}

/// Replacements for the default components, mainly for tests and embedders.
#[derive(Default)]
pub struct CustomComponents {
    pub session: Option<AuthContext>,
    pub backend: Option<Arc<dyn Backend>>,
    pub change_feed: Option<Arc<dyn ChangeFeed>>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl AppComponents {
    pub async fn new(
        config: Config,
        custom_components: Option<CustomComponents>,
    ) -> Result<Self, CommonError> {
        let mut custom = custom_components.unwrap_or_default();
        let mut health = HealthComponent::default();

        let session = match custom.session.take() {
            Some(session) => session,
            None => AppComponents::sign_in(&config).await?,
        };

        let backend: Arc<dyn Backend> = match custom.backend.take() {
            Some(backend) => backend,
            None => {
                let backend = Arc::new(
                    RestBackend::new(&config.backend).authorized(&session.access_token),
                );
                health.register_component(backend.clone(), "backend".to_string());
                backend
            }
        };

        let change_feed: Arc<dyn ChangeFeed> = match custom.change_feed.take() {
            Some(change_feed) => change_feed,
            None => {
                let realtime = Arc::new(RealtimeComponent::new(
                    &config,
                    Some(&session.access_token),
                ));
                health.register_component(realtime.clone(), "realtime".to_string());
                realtime
            }
        };

        let notifier = custom
            .notifier
            .take()
            .unwrap_or_else(|| Arc::new(LogNotifier));

        log::info!("App > Signed in as {}", session.user_id);

        Ok(Self {
            config,
            session,
            backend,
            change_feed,
            notifier,
            health,
        })
    }

    async fn sign_in(config: &Config) -> Result<AuthContext, CommonError> {
        if config.backend.url.is_empty() {
            return Err(CommonError::BadRequest(
                "Missing backend url, set backend.url or VOICE_SOCIAL__BACKEND__URL".to_owned(),
            ));
        }

        SessionComponent::new(&config.backend)
            .sign_in(&config.auth.email, &config.auth.password)
            .await
    }

    /// The context every service operation runs with.
    pub fn social_context(&self) -> Arc<SocialContext> {
        Arc::new(SocialContext::new(
            self.session.clone(),
            self.backend.clone(),
            self.notifier.clone(),
            self.config.matching.clone(),
        ))
    }
}
