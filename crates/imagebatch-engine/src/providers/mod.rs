mod dryrun;
mod replicate;

use std::collections::BTreeMap;

use anyhow::Result;
use imagebatch_contracts::sizes::SupportedSize;

pub use dryrun::DryrunProvider;
pub use replicate::{ReplicateConfig, ReplicateProvider};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub size: SupportedSize,
    pub style: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Remote (or local) text-to-image backend.
///
/// `request.size` is always a catalog entry. Any failure, including fetching
/// the produced image, is reported through the returned error.
pub trait ImageProvider {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{GenerateRequest, GeneratedImage, ImageProvider, ImageProviderRegistry};

    struct Named(&'static str);

    impl ImageProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn generate(&self, _request: &GenerateRequest) -> Result<GeneratedImage> {
            Ok(GeneratedImage {
                bytes: self.0.as_bytes().to_vec(),
                mime_type: None,
            })
        }
    }

    #[test]
    fn registry_lists_names_sorted_and_looks_up() {
        let mut registry = ImageProviderRegistry::new();
        registry.register(Named("replicate"));
        registry.register(Named("dryrun"));
        assert_eq!(registry.names(), vec!["dryrun", "replicate"]);
        assert_eq!(registry.get("dryrun").map(|p| p.name()), Some("dryrun"));
        assert!(registry.get("openai").is_none());
    }
}
