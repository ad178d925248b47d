//! Provider registry and selection.
//!
//! Providers are kept in descending priority order. Availability is asked
//! again on every [`ProviderRegistry::resolve`] call, so a recognizer
//! installed (or an endpoint brought up) after start-up is picked up without
//! rebuilding anything.

use crate::config::EngineConfig;
use crate::error::ExtractionError;
use crate::provider::local::LocalProvider;
use crate::provider::remote::RemoteProvider;
use crate::provider::tesseract::TesseractRecognizer;
use crate::provider::transport::HttpTransport;
use crate::provider::{ProviderDescriptor, ProviderId, TableProvider};
use std::sync::Arc;
use tracing::debug;

/// Ordered set of providers.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn TableProvider>>,
}

impl ProviderRegistry {
    /// Register `providers`; ties in priority keep their given order.
    pub fn new(mut providers: Vec<Arc<dyn TableProvider>>) -> Self {
        providers.sort_by_key(|p| std::cmp::Reverse(p.descriptor().priority));
        Self { providers }
    }

    /// The remote HTTP provider plus the tesseract-backed local provider.
    pub fn with_defaults(config: &EngineConfig) -> Result<Self, ExtractionError> {
        let transport = HttpTransport::new(&config.api_base_url, config.timeout())?;
        let remote = RemoteProvider::new(Arc::new(transport), config);
        let local = LocalProvider::new(
            Arc::new(TesseractRecognizer::from_config(config)),
            config.cluster_options(),
        );
        Ok(Self::new(vec![Arc::new(remote), Arc::new(local)]))
    }

    /// Descriptors in selection order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.providers.iter().map(|p| p.descriptor()).collect()
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn TableProvider>> {
        self.providers
            .iter()
            .find(|p| p.descriptor().id == id)
            .cloned()
    }

    /// Pick the provider for one request.
    ///
    /// With `explicit`, that provider must be registered, available, and
    /// (if it needs one) given a credential. Without it, the highest-priority
    /// available provider whose credential requirement is met wins.
    pub fn resolve(
        &self,
        explicit: Option<ProviderId>,
        credential: Option<&str>,
    ) -> Result<Arc<dyn TableProvider>, ExtractionError> {
        let has_credential = credential.is_some_and(|c| !c.trim().is_empty());

        if let Some(id) = explicit {
            let provider = self
                .get(id)
                .filter(|p| p.is_available())
                .ok_or_else(|| ExtractionError::ProviderUnavailable {
                    provider: id.to_string(),
                })?;
            if provider.descriptor().requires_credential && !has_credential {
                return Err(ExtractionError::MissingCredential {
                    provider: id.to_string(),
                });
            }
            return Ok(provider);
        }

        let available: Vec<&Arc<dyn TableProvider>> =
            self.providers.iter().filter(|p| p.is_available()).collect();
        if available.is_empty() {
            return Err(ExtractionError::UnsupportedEnvironment);
        }

        match available
            .iter()
            .find(|p| !p.descriptor().requires_credential || has_credential)
        {
            Some(p) => {
                debug!("Selected provider '{}'", p.descriptor().id);
                Ok(Arc::clone(p))
            }
            None => Err(ExtractionError::MissingCredential {
                provider: available[0].descriptor().id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ExtractionResult;
    use crate::pipeline::payload::ImagePayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio_util::sync::CancellationToken;

    struct Stub {
        id: ProviderId,
        priority: i32,
        requires_credential: bool,
        available: AtomicBool,
    }

    impl Stub {
        fn new(id: ProviderId, priority: i32, requires_credential: bool, available: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                priority,
                requires_credential,
                available: AtomicBool::new(available),
            })
        }
    }

    #[async_trait]
    impl TableProvider for Stub {
        fn descriptor(&self) -> ProviderDescriptor {
            ProviderDescriptor {
                id: self.id,
                priority: self.priority,
                requires_credential: self.requires_credential,
            }
        }
        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }
        async fn extract(
            &self,
            _image: &ImagePayload,
            _credential: Option<&str>,
            _cancel: &CancellationToken,
        ) -> Result<ExtractionResult, ExtractionError> {
            unreachable!("selection tests never extract")
        }
    }

    fn resolve_err(r: Result<Arc<dyn TableProvider>, ExtractionError>) -> ExtractionError {
        match r {
            Ok(p) => panic!("expected a selection error, got provider '{}'", p.descriptor().id),
            Err(e) => e,
        }
    }

    fn registry(remote_up: bool, local_up: bool) -> ProviderRegistry {
        ProviderRegistry::new(vec![
            Stub::new(ProviderId::Local, 50, false, local_up),
            Stub::new(ProviderId::Remote, 100, true, remote_up),
        ])
    }

    #[test]
    fn orders_by_descending_priority() {
        let ids: Vec<_> = registry(true, true).descriptors().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![ProviderId::Remote, ProviderId::Local]);
    }

    #[test]
    fn prefers_remote_with_credential() {
        let p = registry(true, true).resolve(None, Some("sk")).unwrap();
        assert_eq!(p.descriptor().id, ProviderId::Remote);
    }

    #[test]
    fn falls_back_to_local_without_credential() {
        let r = registry(true, true);
        assert_eq!(r.resolve(None, None).unwrap().descriptor().id, ProviderId::Local);
        assert_eq!(r.resolve(None, Some("  ")).unwrap().descriptor().id, ProviderId::Local);
    }

    #[test]
    fn nothing_available_is_unsupported() {
        let err = resolve_err(registry(false, false).resolve(None, Some("sk")));
        assert!(matches!(err, ExtractionError::UnsupportedEnvironment));
        let err = resolve_err(ProviderRegistry::new(vec![]).resolve(None, None));
        assert!(matches!(err, ExtractionError::UnsupportedEnvironment));
    }

    #[test]
    fn only_remote_without_credential_is_missing_credential() {
        let err = resolve_err(registry(true, false).resolve(None, None));
        assert!(matches!(err, ExtractionError::MissingCredential { ref provider } if provider == "remote"));
    }

    #[test]
    fn explicit_choice_is_honoured_or_refused() {
        let r = registry(true, false);
        assert_eq!(
            r.resolve(Some(ProviderId::Remote), Some("sk")).unwrap().descriptor().id,
            ProviderId::Remote
        );
        let err = resolve_err(r.resolve(Some(ProviderId::Local), Some("sk")));
        assert!(matches!(err, ExtractionError::ProviderUnavailable { .. }));
        let err = resolve_err(r.resolve(Some(ProviderId::Remote), None));
        assert!(matches!(err, ExtractionError::MissingCredential { .. }));
    }

    #[test]
    fn explicit_unregistered_is_unavailable() {
        let r = ProviderRegistry::new(vec![Stub::new(ProviderId::Local, 50, false, true)]);
        let err = resolve_err(r.resolve(Some(ProviderId::Remote), Some("sk")));
        assert!(matches!(err, ExtractionError::ProviderUnavailable { ref provider } if provider == "remote"));
    }

    #[test]
    fn availability_is_rechecked_each_call() {
        let local = Stub::new(ProviderId::Local, 50, false, false);
        let r = ProviderRegistry::new(vec![local.clone()]);
        assert!(r.resolve(None, None).is_err());
        local.available.store(true, Ordering::SeqCst);
        assert_eq!(r.resolve(None, None).unwrap().descriptor().id, ProviderId::Local);
    }

    #[test]
    fn default_registry_has_both_providers() {
        let r = ProviderRegistry::with_defaults(&EngineConfig::default()).unwrap();
        let ids: Vec<_> = r.descriptors().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![ProviderId::Remote, ProviderId::Local]);
    }
}
