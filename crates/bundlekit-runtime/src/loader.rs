use crate::evaluator::{DescriptorEvaluator, EvaluationContext, ManifestEvaluator};
use crate::synthesizer::VirtualManifestSynthesizer;
use bundlekit_schema::{DescriptorError, PackageDescriptor, DESCRIPTOR_FILE};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces the descriptor for an installed package root: the authored one
/// when the root has a `package.toml`, a synthesized one otherwise.
#[derive(Debug, Clone)]
pub struct DescriptorLoader {
    evaluator: Arc<dyn DescriptorEvaluator>,
    synthesizer: VirtualManifestSynthesizer,
}

impl Default for DescriptorLoader {
    fn default() -> Self {
        Self::with_evaluator(Arc::new(ManifestEvaluator::new()))
    }
}

impl DescriptorLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluator(evaluator: Arc<dyn DescriptorEvaluator>) -> Self {
        Self {
            evaluator,
            synthesizer: VirtualManifestSynthesizer::new(),
        }
    }

    /// Evaluated fresh on every call; nothing is cached.
    pub fn load(
        &self,
        root: &Path,
        name: &str,
        version: &str,
    ) -> Result<PackageDescriptor, DescriptorError> {
        let path = root.join(DESCRIPTOR_FILE);
        let descriptor = if path.is_file() {
            let mut context = EvaluationContext::for_descriptor(&path);
            self.evaluator.evaluate(&path, &mut context)?
        } else {
            debug!("{name} {version} has no descriptor, synthesizing one");
            self.synthesizer.synthesize_dir(name, version, root)?
        };

        if descriptor.version != version {
            warn!(
                "descriptor of {name} declares version {} but {version} is locked",
                descriptor.version
            );
        }
        Ok(descriptor)
    }
}
