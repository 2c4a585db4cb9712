//! Compiler options: one plain record passed by reference everywhere.
//!
//! A project file `comal.toml` in the working directory can pre-set any
//! option; explicit command-line flags override it.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Options {
    /// Require explicit declarations; disallow `=` standing in for `:=`.
    pub strict: bool,
    /// Report diagnostics by physical source line rather than Comal line.
    pub ide: bool,
    /// Emit debug info (code-generator concern; the flag is recognised).
    pub debug: bool,
    /// Warning level 0-4.
    pub warn_level: u8,
    pub warn_as_error: bool,
    /// Dump the parse tree as XML alongside the output.
    pub dump: bool,
    /// Do not inline intrinsic calls.
    pub no_inline: bool,
    /// Execute after a successful compile.
    pub run: bool,
    pub output_file: Option<String>,
    pub source_files: Vec<String>,
    pub interactive: bool,
    /// Re-raise internal exceptions instead of reporting COMPILERFAILURE.
    pub dev_mode: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            strict: false,
            ide: false,
            debug: false,
            warn_level: 4,
            warn_as_error: false,
            dump: false,
            no_inline: false,
            run: false,
            output_file: None,
            source_files: Vec::new(),
            interactive: false,
            dev_mode: false,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_warn_level(mut self, level: u8) -> Self {
        self.warn_level = level.min(4);
        self
    }

    pub fn with_warn_as_error(mut self, on: bool) -> Self {
        self.warn_as_error = on;
        self
    }

    /// Fold `comal.toml` settings in. Call before applying command-line
    /// flags so the flags win.
    pub fn merge_toml(&mut self, text: &str) -> Result<(), String> {
        let file: ProjectFile =
            toml::from_str(text).map_err(|e| format!("Failed to parse comal.toml: {}", e))?;
        if let Some(v) = file.strict {
            self.strict = v;
        }
        if let Some(v) = file.ide {
            self.ide = v;
        }
        if let Some(v) = file.debug {
            self.debug = v;
        }
        if let Some(v) = file.warn_level {
            self.warn_level = v.min(4);
        }
        if let Some(v) = file.warn_as_error {
            self.warn_as_error = v;
        }
        if let Some(v) = file.dump {
            self.dump = v;
        }
        if let Some(v) = file.no_inline {
            self.no_inline = v;
        }
        if let Some(v) = file.output_file {
            self.output_file = Some(v);
        }
        Ok(())
    }

    /// Load `comal.toml` from a directory when present; a missing file is
    /// not an error.
    pub fn load_project_file(&mut self, dir: &Path) -> Result<(), String> {
        let path = dir.join("comal.toml");
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        self.merge_toml(&text)
    }
}

/// What `comal.toml` may set. Everything is optional; absent keys leave
/// the option untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectFile {
    strict: Option<bool>,
    ide: Option<bool>,
    debug: Option<bool>,
    warn_level: Option<u8>,
    warn_as_error: Option<bool>,
    dump: Option<bool>,
    no_inline: Option<bool>,
    output_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert_eq!(opts.warn_level, 4);
        assert!(!opts.strict);
        assert!(!opts.warn_as_error);
    }

    #[test]
    fn test_merge_toml() {
        let mut opts = Options::default();
        opts.merge_toml("strict = true\nwarn_level = 2\n").unwrap();
        assert!(opts.strict);
        assert_eq!(opts.warn_level, 2);
    }

    #[test]
    fn test_merge_toml_clamps_warn_level() {
        let mut opts = Options::default();
        opts.merge_toml("warn_level = 9\n").unwrap();
        assert_eq!(opts.warn_level, 4);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let mut opts = Options::default();
        assert!(opts.merge_toml("strct = true\n").is_err());
    }

    #[test]
    fn test_builder() {
        let opts = Options::new().with_strict(true).with_warn_level(1);
        assert!(opts.strict);
        assert_eq!(opts.warn_level, 1);
    }
}
