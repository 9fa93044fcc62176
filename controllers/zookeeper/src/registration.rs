//! Registration of the ZookeeperCluster resource type.
//!
//! The CRD must be `Established` before a watch on it can succeed. The
//! manager creates the CRD (or adopts an identical one left by a previous
//! run), then polls its status conditions until the API server reports it
//! established. If that never happens, a CRD this run created is deleted
//! again so the cluster is left as it was found.
//!
//! Success yields a [`Registration`], which the watcher requires: watching
//! cannot start before registration completes.

use crate::error::RegistrationError;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionCondition,
};
use platform_client::PlatformClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where the registration handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Nothing attempted yet
    NotRegistered,
    /// CRD submitted, waiting for `Established`
    InFlight,
    /// CRD established; watching may start
    Established,
    /// Registration failed (and was rolled back where applicable)
    Failed,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            RegistrationState::NotRegistered => "NotRegistered",
            RegistrationState::InFlight => "InFlight",
            RegistrationState::Established => "Established",
            RegistrationState::Failed => "Failed",
        };
        f.write_str(state)
    }
}

/// Proof that the resource type is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    crd_name: String,
    created: bool,
}

impl Registration {
    /// Name of the established CRD
    pub fn crd_name(&self) -> &str {
        &self.crd_name
    }

    /// Whether this run created the CRD (as opposed to adopting it)
    pub fn created(&self) -> bool {
        self.created
    }
}

/// Polling cadence of the establishment handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSettings {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Give up (and roll back) after this long
    pub deadline: Duration,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            deadline: Duration::from_secs(60),
        }
    }
}

enum PollFailure {
    NamesRejected(String),
    NotEstablished(String),
}

fn condition_is<'a>(
    conditions: &'a [CustomResourceDefinitionCondition],
    type_: &str,
    status: &str,
) -> Option<&'a CustomResourceDefinitionCondition> {
    conditions.iter().find(|c| c.type_ == type_ && c.status == status)
}

/// Drives the registration handshake against the platform.
pub struct RegistrationManager<C: PlatformClient> {
    client: Arc<C>,
    settings: RegistrationSettings,
    state: RegistrationState,
}

impl<C: PlatformClient> fmt::Debug for RegistrationManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationManager")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<C: PlatformClient> RegistrationManager<C> {
    /// Creates a new registration manager.
    pub fn new(client: Arc<C>, settings: RegistrationSettings) -> Self {
        Self {
            client,
            settings,
            state: RegistrationState::NotRegistered,
        }
    }

    /// Current state of the handshake
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    fn transition(&mut self, next: RegistrationState) {
        info!("Registration state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Make sure `crd` is registered and established.
    ///
    /// Idempotent across controller restarts: an existing CRD with the same
    /// group and kind is adopted rather than recreated.
    pub async fn ensure_registered(
        &mut self,
        crd: &CustomResourceDefinition,
    ) -> Result<Registration, RegistrationError> {
        let name = crd.metadata.name.clone().unwrap_or_default();
        self.transition(RegistrationState::InFlight);

        let created = match self.claim(crd, &name).await {
            Ok(created) => created,
            Err(e) => {
                error!("Failed to register {}: {}", name, e);
                self.transition(RegistrationState::Failed);
                return Err(e);
            }
        };

        match self.await_established(&name).await {
            Ok(()) => {
                self.transition(RegistrationState::Established);
                Ok(Registration { crd_name: name, created })
            }
            Err(failure) => {
                let err = self.roll_back(&name, created, failure).await;
                error!("Failed to register {}: {}", name, err);
                self.transition(RegistrationState::Failed);
                Err(err)
            }
        }
    }

    /// Submit the CRD. Returns whether this call created it.
    async fn claim(
        &self,
        crd: &CustomResourceDefinition,
        name: &str,
    ) -> Result<bool, RegistrationError> {
        if self.adopt_existing(crd, name).await? {
            return Ok(false);
        }

        match self.client.create_custom_resource_definition(crd).await {
            Ok(()) => {
                info!("Created CustomResourceDefinition {}", name);
                Ok(true)
            }
            // Lost a create race: whoever won must have registered the same type
            Err(e) if e.is_already_exists() => {
                if self.adopt_existing(crd, name).await? {
                    Ok(false)
                } else {
                    Err(RegistrationError::PlatformUnreachable(e))
                }
            }
            Err(e) => Err(RegistrationError::PlatformUnreachable(e)),
        }
    }

    async fn adopt_existing(
        &self,
        crd: &CustomResourceDefinition,
        name: &str,
    ) -> Result<bool, RegistrationError> {
        let existing = self
            .client
            .get_custom_resource_definition(name)
            .await
            .map_err(RegistrationError::PlatformUnreachable)?;

        let Some(existing) = existing else {
            return Ok(false);
        };

        if existing.spec.group == crd.spec.group
            && existing.spec.names.kind == crd.spec.names.kind
        {
            info!("CustomResourceDefinition {} already exists, reusing it", name);
            Ok(true)
        } else {
            Err(RegistrationError::NameConflict(format!(
                "{} is already registered for {}/{}",
                name, existing.spec.group, existing.spec.names.kind
            )))
        }
    }

    async fn await_established(&self, name: &str) -> Result<(), PollFailure> {
        let poll = async {
            loop {
                let conditions = self
                    .client
                    .custom_resource_definition_conditions(name)
                    .await
                    .map_err(|e| PollFailure::NotEstablished(format!("status poll failed: {e}")))?;

                if condition_is(&conditions, "Established", "True").is_some() {
                    return Ok(());
                }
                if let Some(rejected) = condition_is(&conditions, "NamesAccepted", "False") {
                    let reason = rejected
                        .message
                        .clone()
                        .or_else(|| rejected.reason.clone())
                        .unwrap_or_else(|| "names not accepted".to_string());
                    return Err(PollFailure::NamesRejected(format!("{name}: {reason}")));
                }

                debug!(
                    "{} not established yet, polling again in {:?}",
                    name, self.settings.poll_interval
                );
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.settings.deadline, poll).await {
            Ok(result) => result,
            Err(_) => Err(PollFailure::NotEstablished(format!(
                "deadline of {:?} exceeded",
                self.settings.deadline
            ))),
        }
    }

    async fn roll_back(
        &self,
        name: &str,
        created: bool,
        failure: PollFailure,
    ) -> RegistrationError {
        let cleanup = if created {
            warn!("Rolling back CustomResourceDefinition {}", name);
            match self.client.delete_custom_resource_definition(name).await {
                Ok(()) => None,
                Err(e) => {
                    error!("Rollback of {} failed: {}", name, e);
                    Some(e.to_string())
                }
            }
        } else {
            None
        };

        match failure {
            PollFailure::NamesRejected(message) => RegistrationError::NameConflict(message),
            PollFailure::NotEstablished(cause) => RegistrationError::EstablishmentTimeout {
                name: name.to_string(),
                cause,
                cleanup,
            },
        }
    }
}
