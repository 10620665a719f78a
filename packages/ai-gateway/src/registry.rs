use std::{path::Path, sync::Arc};

use reqwest::Url;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::db;
use crate::error::{AiError, AiResult};
use crate::models::{FrontendProvider, NewProvider, ProviderConfig, ProviderUpdate, Vendor};

/**
 * \brief Source of truth for configured providers and which one answers frontend requests.
 * \details Every call reads the store fresh; nothing is cached between calls. Cloning shares
 *          the underlying connection.
 */
#[derive(Clone)]
pub struct ProviderRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl ProviderRegistry {
    /**
     * \brief Open (and migrate) the registry file at `path`.
     */
    pub fn open(path: &Path) -> AiResult<Self> {
        let conn = db::open_db(path).map_err(AiError::Storage)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> AiResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| AiError::Storage(e.into()))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> AiResult<Self> {
        db::migrate(&conn).map_err(AiError::Storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, action: F) -> AiResult<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let conn = self.conn.lock().await;
        action(&conn).map_err(AiError::Storage)
    }

    pub async fn get_provider_config(&self, id: i64) -> AiResult<ProviderConfig> {
        self.with_conn(|conn| db::get_provider_by_id(conn, id))
            .await?
            .ok_or_else(AiError::provider_not_found)
    }

    /** \brief Every provider, ordered by name. */
    pub async fn get_all_providers(&self) -> AiResult<Vec<ProviderConfig>> {
        self.with_conn(db::list_providers).await
    }

    pub async fn update_frontend_visibility(
        &self,
        id: i64,
        visible: bool,
    ) -> AiResult<ProviderConfig> {
        let updated = self
            .with_conn(|conn| db::set_frontend_visibility(conn, id, visible))
            .await?;
        if !updated {
            return Err(AiError::provider_not_found());
        }
        tracing::info!(provider_id = id, visible, "provider visibility updated");
        self.get_provider_config(id).await
    }

    /**
     * \brief Make `id` the only default provider.
     */
    pub async fn set_default_provider(&self, id: i64) -> AiResult<ProviderConfig> {
        let updated = self
            .with_conn(|conn| db::set_default_provider(conn, id))
            .await?;
        if !updated {
            return Err(AiError::provider_not_found());
        }
        tracing::info!(provider_id = id, "default provider changed");
        self.get_provider_config(id).await
    }

    /**
     * \brief Provider for end-user features: the visible default, else the first visible by
     *        name. Only non-secret fields are returned.
     */
    pub async fn get_active_frontend_provider(&self) -> AiResult<FrontendProvider> {
        self.with_conn(db::find_active_frontend_provider)
            .await?
            .map(|p| p.frontend_view(false))
            .ok_or_else(|| {
                AiError::NotFound("No AI provider is available for frontend use".to_string())
            })
    }

    /** \brief Visible providers, default first then by name, without secrets. */
    pub async fn get_frontend_visible_providers(&self) -> AiResult<Vec<FrontendProvider>> {
        let providers = self.with_conn(db::list_visible_providers).await?;
        Ok(providers.iter().map(|p| p.frontend_view(true)).collect())
    }

    pub async fn create_provider(&self, mut input: NewProvider) -> AiResult<ProviderConfig> {
        input.name = input.name.trim().to_string();
        input.model = input.model.trim().to_string();
        input.api_key = non_blank(input.api_key);
        input.base_url = non_blank(input.base_url);
        let vendor = input
            .vendor
            .parse::<Vendor>()
            .map_err(|_| AiError::InvalidInput(format!("unknown vendor '{}'", input.vendor)))?;
        validate(
            vendor,
            &input.name,
            &input.model,
            input.api_key.as_deref(),
            input.base_url.as_deref(),
        )?;

        let id = self
            .with_conn(|conn| db::insert_provider(conn, &input))
            .await?;
        tracing::info!(provider_id = id, vendor = %vendor, name = %input.name, "provider created");
        self.get_provider_config(id).await
    }

    /**
     * \brief Apply a partial update. The vendor tag itself is not editable.
     */
    pub async fn update_provider(
        &self,
        id: i64,
        update: ProviderUpdate,
    ) -> AiResult<ProviderConfig> {
        let mut current = self.get_provider_config(id).await?;
        if let Some(name) = update.name {
            current.name = name.trim().to_string();
        }
        if let Some(model) = update.model {
            current.model = model.trim().to_string();
        }
        if update.api_key.is_some() {
            current.api_key = non_blank(update.api_key);
        }
        if update.base_url.is_some() {
            current.base_url = non_blank(update.base_url);
        }
        if let Some(visible) = update.is_visible_to_frontend {
            current.is_visible_to_frontend = visible;
        }
        // Rows carrying an unknown tag can still be renamed or hidden.
        if let Ok(vendor) = current.vendor_kind() {
            validate(
                vendor,
                &current.name,
                &current.model,
                current.api_key.as_deref(),
                current.base_url.as_deref(),
            )?;
        }

        let updated = self
            .with_conn(|conn| {
                let updated = db::update_provider(conn, &current)?;
                match update.is_default {
                    Some(true) if updated => {
                        db::set_default_provider(conn, id)?;
                    }
                    Some(false) if updated => db::clear_default_provider(conn, id)?,
                    _ => {}
                }
                Ok(updated)
            })
            .await?;
        if !updated {
            return Err(AiError::provider_not_found());
        }
        tracing::info!(provider_id = id, "provider updated");
        self.get_provider_config(id).await
    }

    pub async fn delete_provider(&self, id: i64) -> AiResult<()> {
        let deleted = self
            .with_conn(|conn| db::delete_provider(conn, id))
            .await?;
        if !deleted {
            return Err(AiError::provider_not_found());
        }
        tracing::info!(provider_id = id, "provider deleted");
        Ok(())
    }

    pub async fn telemetry_enabled(&self) -> AiResult<bool> {
        self.with_conn(db::get_telemetry_enabled).await
    }

    pub async fn set_telemetry_enabled(&self, enabled: bool) -> AiResult<()> {
        self.with_conn(|conn| db::set_telemetry_enabled(conn, enabled))
            .await
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate(
    vendor: Vendor,
    name: &str,
    model: &str,
    api_key: Option<&str>,
    base_url: Option<&str>,
) -> AiResult<()> {
    if name.is_empty() {
        return Err(AiError::InvalidInput("name is required".to_string()));
    }
    if model.is_empty() {
        return Err(AiError::InvalidInput("model is required".to_string()));
    }
    if let Some(url) = base_url {
        let parsed = Url::parse(url)
            .map_err(|_| AiError::InvalidInput("base URL must be a valid URL".to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AiError::InvalidInput(
                "base URL must use http or https".to_string(),
            ));
        }
    }
    match vendor {
        Vendor::Custom if base_url.is_none() => Err(AiError::InvalidInput(
            "custom providers require a base URL".to_string(),
        )),
        Vendor::OpenAI | Vendor::Anthropic | Vendor::HuggingFace if api_key.is_none() => Err(
            AiError::InvalidInput(format!("{} providers require an API key", vendor)),
        ),
        _ => Ok(()),
    }
}
