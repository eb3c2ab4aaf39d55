use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra::*;
use crate::infra_http::*;
use crate::infra_redis::*;
use crate::settings::Settings;
use std::sync::Arc;
use tracing::info;

/// Everything feature code needs to talk to the backend as the signed-in user.
pub struct ApiClient {
    pub gateway: Arc<dyn RequestGateway>,
    pub auth_service: Arc<dyn AuthService>,
    pub store: Arc<dyn CredentialStore>,
}

impl ApiClient {
    pub async fn try_new(
        settings: &Settings,
        listener: Arc<dyn SessionListener>,
    ) -> anyhow::Result<Self> {
        let store: Arc<dyn CredentialStore> = match settings.store.backend.as_str() {
            "memory" => Arc::new(MemoryCredentialStore::new()),
            "file" => Arc::new(FileCredentialStore::open(&settings.store.path).await?),
            "redis" => {
                let redis_client = redis::Client::open(settings.store.redis_url.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisCredentialStore::new(
                    redis_manager,
                    settings.store.prefix.clone(),
                ))
            }
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let transport: Arc<dyn HttpTransport> = match settings.api.transport.as_str() {
            "http" => Arc::new(ReqwestTransport::try_new(
                &settings.api.base_url,
                settings.api.request_timeout(),
            )?),
            "fake" => Arc::new(FakeHttpTransport::new(settings.session.refresh_path.as_str())),
            other => return Err(anyhow::anyhow!("Unknown transport: {}", other)),
        };

        Ok(Self::from_parts(
            store,
            transport,
            listener,
            GatewayConfig {
                refresh_path: settings.session.refresh_path.clone(),
                refresh_timeout: settings.session.refresh_timeout(),
            },
        ))
    }

    pub fn from_parts(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn HttpTransport>,
        listener: Arc<dyn SessionListener>,
        config: GatewayConfig,
    ) -> Self {
        info!(refresh_path = %config.refresh_path, "api client ready");
        let gateway: Arc<dyn RequestGateway> = Arc::new(AuthenticatedRequestGateway::new(
            store.clone(),
            transport.clone(),
            listener,
            config,
        ));
        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            gateway.clone(),
            transport,
            store.clone(),
        ));

        Self {
            gateway,
            auth_service,
            store,
        }
    }
}
