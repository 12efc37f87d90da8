use crate::synthesizer::list_files;
use bundlekit_schema::{
    DescriptorError, DescriptorEvaluationError, DescriptorOrigin, PackageDescriptor,
    RawDescriptor,
};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Working directory and top-level symbol table for one descriptor evaluation.
///
/// Relative references resolve against the working directory; the process
/// working directory is never touched. There is a single scope: symbols from
/// loaded files and from `[define]` all land in the same table, and later
/// definitions shadow earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    working_dir: PathBuf,
    symbols: BTreeMap<String, String>,
}

impl EvaluationContext {
    /// Context rooted at the descriptor's parent directory.
    pub fn for_descriptor(descriptor: &Path) -> Self {
        let working_dir = descriptor
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let mut symbols = BTreeMap::new();
        symbols.insert(
            "PACKAGE_DIR".to_owned(),
            working_dir.to_string_lossy().into_owned(),
        );
        symbols.insert(
            "DESCRIPTOR".to_owned(),
            descriptor.to_string_lossy().into_owned(),
        );
        Self {
            working_dir,
            symbols,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn resolve(&self, reference: &str) -> PathBuf {
        self.working_dir.join(reference)
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.symbols.insert(name.into(), value.into());
    }

    pub fn symbol(&self, name: &str) -> Option<&str> {
        self.symbols.get(name).map(String::as_str)
    }

    /// Replace every `${NAME}` with its symbol value. An unterminated `${`
    /// is kept literally. Returns the first undefined symbol as the error.
    pub fn interpolate(&self, text: &str) -> Result<String, String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = after[..end].trim();
            match self.symbol(name) {
                Some(value) => out.push_str(value),
                None => return Err(name.to_owned()),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Turns a descriptor file into a [`PackageDescriptor`].
pub trait DescriptorEvaluator: Send + Sync + fmt::Debug {
    fn evaluate(
        &self,
        descriptor: &Path,
        context: &mut EvaluationContext,
    ) -> Result<PackageDescriptor, DescriptorError>;
}

/// Evaluates authored `package.toml` descriptors.
///
/// Files named in `load` are read first, in order, each contributing string
/// symbols to the top-level table. `[define]` entries follow. Then `name`,
/// `version`, `summary` and the `files` patterns are interpolated.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestEvaluator;

impl ManifestEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate with a fresh context rooted at the descriptor's directory.
    pub fn evaluate_path(&self, descriptor: &Path) -> Result<PackageDescriptor, DescriptorError> {
        let mut context = EvaluationContext::for_descriptor(descriptor);
        self.evaluate(descriptor, &mut context)
    }
}

impl DescriptorEvaluator for ManifestEvaluator {
    fn evaluate(
        &self,
        descriptor: &Path,
        context: &mut EvaluationContext,
    ) -> Result<PackageDescriptor, DescriptorError> {
        debug!("evaluating descriptor {}", descriptor.display());
        let content = fs::read_to_string(descriptor).map_err(|source| DescriptorError::Read {
            path: descriptor.to_path_buf(),
            source,
        })?;
        let raw: RawDescriptor =
            toml::from_str(&content).map_err(|source| DescriptorError::Parse {
                path: descriptor.to_path_buf(),
                source,
            })?;

        for reference in &raw.load {
            let reference = interpolate(context, descriptor, reference)?;
            load_symbols(descriptor, &reference, context)?;
        }
        for (name, value) in &raw.define {
            let value = interpolate(context, descriptor, value)?;
            context.define(name.clone(), value);
        }

        let name = required_field(context, descriptor, raw.name.as_deref(), "name")?;
        let version = required_field(context, descriptor, raw.version.as_deref(), "version")?;
        let summary = match raw.summary.as_deref() {
            Some(s) => interpolate(context, descriptor, s)?,
            None => String::new(),
        };

        let mut patterns = Vec::with_capacity(raw.files.len());
        for pattern in &raw.files {
            patterns.push(interpolate(context, descriptor, pattern)?);
        }
        let files = expand_patterns(descriptor, context.working_dir(), &patterns)?;

        Ok(PackageDescriptor {
            name,
            version,
            summary,
            files,
            origin: DescriptorOrigin::Authored {
                path: descriptor.to_path_buf(),
            },
        })
    }
}

fn interpolate(
    context: &EvaluationContext,
    descriptor: &Path,
    text: &str,
) -> Result<String, DescriptorError> {
    context
        .interpolate(text)
        .map_err(|symbol| DescriptorError::UndefinedSymbol {
            path: descriptor.to_path_buf(),
            symbol,
        })
}

fn required_field(
    context: &EvaluationContext,
    descriptor: &Path,
    value: Option<&str>,
    field: &'static str,
) -> Result<String, DescriptorError> {
    let missing = || DescriptorError::MissingField {
        path: descriptor.to_path_buf(),
        field,
    };
    let value = interpolate(context, descriptor, value.ok_or_else(missing)?)?;
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Err(missing());
    }
    Ok(value)
}

fn load_symbols(
    descriptor: &Path,
    reference: &str,
    context: &mut EvaluationContext,
) -> Result<(), DescriptorError> {
    let target = context.resolve(reference);
    let content = match fs::read_to_string(&target) {
        Ok(content) => content,
        Err(cause) if cause.kind() == io::ErrorKind::NotFound => {
            return Err(DescriptorEvaluationError {
                descriptor: descriptor.to_path_buf(),
                missing: target,
                working_dir: context.working_dir().to_path_buf(),
                cause,
            }
            .into());
        }
        Err(source) => {
            return Err(DescriptorError::Read {
                path: target,
                source,
            })
        }
    };

    let symbols: BTreeMap<String, String> =
        toml::from_str(&content).map_err(|e| DescriptorError::InvalidSymbols {
            path: descriptor.to_path_buf(),
            loaded: target.clone(),
            reason: e.to_string(),
        })?;
    debug!(
        "loaded {} symbol(s) from {}",
        symbols.len(),
        target.display()
    );
    for (name, value) in symbols {
        context.define(name, value);
    }
    Ok(())
}

fn expand_patterns(
    descriptor: &Path,
    root: &Path,
    patterns: &[String],
) -> Result<Vec<String>, DescriptorError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let compiled = patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| DescriptorError::InvalidPattern {
                path: descriptor.to_path_buf(),
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let files = list_files(root).map_err(|source| DescriptorError::Listing {
        path: root.to_path_buf(),
        source,
    })?;
    Ok(files
        .into_iter()
        .filter(|f| compiled.iter().any(|p| p.matches_with(f, options)))
        .collect())
}
