//! Kernel engine abstraction.

use std::fmt;

use super::args::KernelArgs;
use super::work_size::WorkSize;
use crate::{ComputeError, ComputeResult};

/// Identifies a kernel program: entry point plus the source it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelInfo {
    /// Entry point name.
    pub name: &'static str,
    /// Program source file.
    pub source_file: &'static str,
}

impl KernelInfo {
    /// Entry `name` in `source_file`.
    pub const fn new(name: &'static str, source_file: &'static str) -> Self {
        Self { name, source_file }
    }
}

/// Compile-time defines passed to a kernel build (`-DNAME=VALUE`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KernelOptions {
    defines: Vec<(String, String)>,
}

impl KernelOptions {
    /// No build options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a define.
    pub fn define(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.defines.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.defines.push((name, value)),
        }
        self
    }

    /// Parses a build option string such as `-DPYRAMID_UV=1 -DLEVEL=2`.
    ///
    /// A define without `=` gets the value `1`.
    pub fn parse(options: &str) -> ComputeResult<Self> {
        let mut parsed = Self::new();
        for token in options.split_whitespace() {
            let body = token.strip_prefix("-D").ok_or_else(|| ComputeError::BuildFailed {
                kernel: String::new(),
                reason: format!("unsupported build option '{}'", token),
            })?;
            let (name, value) = body.split_once('=').unwrap_or((body, "1"));
            if name.is_empty() {
                return Err(ComputeError::BuildFailed {
                    kernel: String::new(),
                    reason: format!("empty define in '{}'", token),
                });
            }
            parsed = parsed.define(name, value);
        }
        Ok(parsed)
    }

    /// Value of a define.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.defines
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if no define is set.
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }
}

impl fmt::Display for KernelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.defines.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "-D{}={}", name, value)?;
        }
        Ok(())
    }
}

/// Completion token for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelEvent {
    seq: u64,
}

impl KernelEvent {
    /// Event for submission `seq`.
    pub const fn new(seq: u64) -> Self {
        Self { seq }
    }

    /// Submission sequence number (1-based).
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

/// A device that builds and runs kernels.
///
/// Dispatch may return before the kernel finishes. Kernels submitted to one
/// engine run in submission order, so a consumer dispatched after its
/// producer always sees the producer's output.
pub trait KernelEngine: Send + Sync {
    /// Backend-specific compiled kernel.
    type Kernel: Send + Sync;

    /// Backend name.
    fn name(&self) -> &str;

    /// Builds a kernel from its program and defines.
    fn compile(&self, info: &KernelInfo, options: &KernelOptions) -> ComputeResult<Self::Kernel>;

    /// Binds arguments and enqueues one dispatch.
    fn dispatch(
        &self,
        kernel: &Self::Kernel,
        args: &KernelArgs,
        work_size: &WorkSize,
    ) -> ComputeResult<KernelEvent>;

    /// Blocks until `event` has completed.
    fn wait(&self, event: KernelEvent) -> ComputeResult<()>;

    /// Blocks until every submitted dispatch has completed.
    fn finish(&self) -> ComputeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_roundtrip_string() {
        let opts = KernelOptions::new().define("PYRAMID_UV", 1);
        assert_eq!(opts.to_string(), "-DPYRAMID_UV=1");
        assert_eq!(KernelOptions::parse("-DPYRAMID_UV=1").unwrap(), opts);
    }

    #[test]
    fn test_options_parse() {
        let opts = KernelOptions::parse("  -DA=3 -DFLAG -DA=4 ").unwrap();
        assert_eq!(opts.get("A"), Some("4"));
        assert_eq!(opts.get("FLAG"), Some("1"));
        assert_eq!(opts.get("B"), None);
        assert!(KernelOptions::parse("").unwrap().is_empty());
        assert!(KernelOptions::parse("-cl-fast-relaxed-math").is_err());
        assert!(KernelOptions::parse("-D=1").is_err());
    }
}
