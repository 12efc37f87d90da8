//! Declaration and lock parsing, fingerprints, package descriptors, and the
//! environment artifact format for bundlekit.
//!
//! This crate is the schema layer: the dependency `Declaration` with the
//! fingerprint of its text, the resolved `LockSpec`, the `PackageDescriptor`
//! model (authored or synthesized), and the `EnvironmentArtifact` file that
//! the generator writes and the sandbox activates.

pub mod artifact;
pub mod declaration;
pub mod descriptor;
pub mod fingerprint;
pub mod lock;
pub mod normalize;
pub mod types;

pub use artifact::{
    sniff_generator_version, ArtifactEnvironment, ArtifactError, ArtifactHeader, ArtifactStamp,
    EnvironmentArtifact, LoadPathEntry, GENERATOR_NAME,
};
pub use declaration::{Declaration, DeclarationError, Dependency, ANY_VERSION};
pub use descriptor::{
    DescriptorError, DescriptorEvaluationError, DescriptorOrigin, PackageDescriptor,
    RawDescriptor, DESCRIPTOR_FILE,
};
pub use fingerprint::fingerprint_declaration;
pub use lock::{LockError, LockSpec, LockedPackage, PackageSource};
pub use normalize::{normalize_declaration_text, normalize_groups, DEFAULT_GROUP};
pub use types::{Fingerprint, ToolVersion};

/// Version of the running tool, stamped into every generated artifact.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
