//! The remote authority, as the engine sees it.
//!
//! `GameBackend` covers what a player needs and `AdminBackend` adds the
//! authoring endpoints. Both are implemented for the HTTP client and for
//! [`crate::testing::MockAuthority`].

use crate::chain::{Direction, PromptComponent};
use crate::id::{ComponentId, LevelId};
use crate::level::{Level, LevelPatch};
use crate::session_id::SessionId;
use crate::Error;
use async_trait::async_trait;
use jailbreak_api::{ChatRequest, Client};
use std::sync::Arc;

/// Player-facing endpoints.
#[async_trait]
pub trait GameBackend: Send + Sync {
    /// All levels in authority order, without secrets.
    async fn levels(&self) -> Result<Vec<Level>, Error>;

    async fn validate_password(&self, level: &LevelId, candidate: &str) -> Result<bool, Error>;

    async fn chat(
        &self,
        level: &LevelId,
        session: &SessionId,
        request: &ChatRequest,
    ) -> Result<String, Error>;
}

/// Authoring endpoints.
#[async_trait]
pub trait AdminBackend: GameBackend {
    /// All levels including secrets and prompt chains.
    async fn admin_levels(&self) -> Result<Vec<Level>, Error>;

    /// Create a level. The authority assigns the id and a password.
    async fn create_level(&self, name: &str) -> Result<Level, Error>;

    async fn modify_level(&self, level: &LevelId, patch: &LevelPatch) -> Result<(), Error>;

    async fn delete_level(&self, level: &LevelId) -> Result<(), Error>;

    /// The component library in library order.
    async fn components(&self) -> Result<Vec<PromptComponent>, Error>;

    async fn create_component(&self, text: &str) -> Result<ComponentId, Error>;

    async fn update_component(&self, component: &ComponentId, text: &str) -> Result<(), Error>;

    async fn delete_component(&self, component: &ComponentId) -> Result<(), Error>;

    async fn move_component(&self, component: &ComponentId, direction: Direction) -> Result<(), Error>;
}

#[async_trait]
impl GameBackend for Client {
    async fn levels(&self) -> Result<Vec<Level>, Error> {
        let raw = Client::levels(self).await?;
        Ok(raw
            .into_iter()
            .map(Level::from_public)
            .collect::<Result<_, _>>()?)
    }

    async fn validate_password(&self, level: &LevelId, candidate: &str) -> Result<bool, Error> {
        Ok(Client::validate_password(self, level.as_str(), candidate).await?)
    }

    async fn chat(
        &self,
        level: &LevelId,
        session: &SessionId,
        request: &ChatRequest,
    ) -> Result<String, Error> {
        Ok(Client::chat(self, level.as_str(), session.as_str(), request).await?)
    }
}

#[async_trait]
impl AdminBackend for Client {
    async fn admin_levels(&self) -> Result<Vec<Level>, Error> {
        let raw = Client::admin_levels(self).await?;
        Ok(raw
            .into_iter()
            .map(Level::from_admin)
            .collect::<Result<_, _>>()?)
    }

    async fn create_level(&self, name: &str) -> Result<Level, Error> {
        let raw = Client::create_level(self, name).await?;
        Ok(Level::from_admin(raw)?)
    }

    async fn modify_level(&self, level: &LevelId, patch: &LevelPatch) -> Result<(), Error> {
        Ok(Client::modify_level(self, level.as_str(), &patch.to_body()).await?)
    }

    async fn delete_level(&self, level: &LevelId) -> Result<(), Error> {
        Ok(Client::delete_level(self, level.as_str()).await?)
    }

    async fn components(&self) -> Result<Vec<PromptComponent>, Error> {
        let raw = Client::components(self).await?;
        raw.into_iter()
            .map(|c| -> Result<PromptComponent, Error> {
                Ok(PromptComponent {
                    id: ComponentId::from_wire(c.component_id)?,
                    text: c.text,
                })
            })
            .collect()
    }

    async fn create_component(&self, text: &str) -> Result<ComponentId, Error> {
        let raw = Client::create_component(self, text).await?;
        Ok(ComponentId::from_wire(raw)?)
    }

    async fn update_component(&self, component: &ComponentId, text: &str) -> Result<(), Error> {
        Ok(Client::update_component(self, component.as_str(), text).await?)
    }

    async fn delete_component(&self, component: &ComponentId) -> Result<(), Error> {
        Ok(Client::delete_component(self, component.as_str()).await?)
    }

    async fn move_component(&self, component: &ComponentId, direction: Direction) -> Result<(), Error> {
        Ok(Client::move_component(self, component.as_str(), direction).await?)
    }
}

#[async_trait]
impl<B: GameBackend + ?Sized> GameBackend for Arc<B> {
    async fn levels(&self) -> Result<Vec<Level>, Error> {
        (**self).levels().await
    }

    async fn validate_password(&self, level: &LevelId, candidate: &str) -> Result<bool, Error> {
        (**self).validate_password(level, candidate).await
    }

    async fn chat(
        &self,
        level: &LevelId,
        session: &SessionId,
        request: &ChatRequest,
    ) -> Result<String, Error> {
        (**self).chat(level, session, request).await
    }
}

#[async_trait]
impl<B: AdminBackend + ?Sized> AdminBackend for Arc<B> {
    async fn admin_levels(&self) -> Result<Vec<Level>, Error> {
        (**self).admin_levels().await
    }

    async fn create_level(&self, name: &str) -> Result<Level, Error> {
        (**self).create_level(name).await
    }

    async fn modify_level(&self, level: &LevelId, patch: &LevelPatch) -> Result<(), Error> {
        (**self).modify_level(level, patch).await
    }

    async fn delete_level(&self, level: &LevelId) -> Result<(), Error> {
        (**self).delete_level(level).await
    }

    async fn components(&self) -> Result<Vec<PromptComponent>, Error> {
        (**self).components().await
    }

    async fn create_component(&self, text: &str) -> Result<ComponentId, Error> {
        (**self).create_component(text).await
    }

    async fn update_component(&self, component: &ComponentId, text: &str) -> Result<(), Error> {
        (**self).update_component(component, text).await
    }

    async fn delete_component(&self, component: &ComponentId) -> Result<(), Error> {
        (**self).delete_component(component).await
    }

    async fn move_component(&self, component: &ComponentId, direction: Direction) -> Result<(), Error> {
        (**self).move_component(component, direction).await
    }
}
