//! Compile diagnostics: codes, severities, and the collector the whole
//! front end reports through.
//!
//! Diagnostics are data, not control flow. The parsers report and keep
//! going; the caller checks `has_errors` at the end and decides the exit
//! status.

use std::fmt;

/// Abstract diagnostic codes. The numeric value is not part of any
/// contract; the names are what users see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    SourceFileNotFound,
    ExpectedToken,
    UnexpectedToken,
    EndOfStatement,
    MissingEndStatement,
    TokenNotPermitted,
    MethodNotFound,
    SubfuncDefined,
    ParameterDefined,
    ParameterCountMismatch,
    TypeMismatch,
    IntegerExpected,
    StringExpected,
    NumberExpected,
    ConstantExpected,
    UndefinedVariable,
    UndefinedFunction,
    LabelAlreadyDeclared,
    UndefinedLabel,
    GotoIntoBlock,
    MissingArrayDimensions,
    ArrayIllegalBounds,
    TooManyDimensions,
    MissingStringDeclaration,
    BadSubstringSpec,
    InvalidOf,
    IllegalReturn,
    IllegalAtWithFile,
    AlreadyExported,
    AlreadyImported,
    NotInClosed,
    BadExit,
    DivisionByZero,
    LoopSkipped,
    UnusedVariable,
    MissingExport,
    MissingReturn,
    CompilerFailure,
}

impl ErrorCode {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::SourceFileNotFound => "SOURCEFILENOTFOUND",
            ErrorCode::ExpectedToken => "EXPECTEDTOKEN",
            ErrorCode::UnexpectedToken => "UNEXPECTEDTOKEN",
            ErrorCode::EndOfStatement => "ENDOFSTATEMENT",
            ErrorCode::MissingEndStatement => "MISSINGENDSTATEMENT",
            ErrorCode::TokenNotPermitted => "TOKENNOTPERMITTED",
            ErrorCode::MethodNotFound => "METHODNOTFOUND",
            ErrorCode::SubfuncDefined => "SUBFUNCDEFINED",
            ErrorCode::ParameterDefined => "PARAMETERDEFINED",
            ErrorCode::ParameterCountMismatch => "PARAMETERCOUNTMISMATCH",
            ErrorCode::TypeMismatch => "TYPEMISMATCH",
            ErrorCode::IntegerExpected => "INTEGEREXPECTED",
            ErrorCode::StringExpected => "STRINGEXPECTED",
            ErrorCode::NumberExpected => "NUMBEREXPECTED",
            ErrorCode::ConstantExpected => "CONSTANTEXPECTED",
            ErrorCode::UndefinedVariable => "UNDEFINEDVARIABLE",
            ErrorCode::UndefinedFunction => "UNDEFINEDFUNCTION",
            ErrorCode::LabelAlreadyDeclared => "LABELALREADYDECLARED",
            ErrorCode::UndefinedLabel => "UNDEFINEDLABEL",
            ErrorCode::GotoIntoBlock => "GOTOINTOBLOCK",
            ErrorCode::MissingArrayDimensions => "MISSINGARRAYDIMENSIONS",
            ErrorCode::ArrayIllegalBounds => "ARRAYILLEGALBOUNDS",
            ErrorCode::TooManyDimensions => "TOOMANYDIMENSIONS",
            ErrorCode::MissingStringDeclaration => "MISSINGSTRINGDECLARATION",
            ErrorCode::BadSubstringSpec => "BADSUBSTRINGSPEC",
            ErrorCode::InvalidOf => "INVALIDOF",
            ErrorCode::IllegalReturn => "ILLEGALRETURN",
            ErrorCode::IllegalAtWithFile => "ILLEGALATWITHFILE",
            ErrorCode::AlreadyExported => "ALREADYEXPORTED",
            ErrorCode::AlreadyImported => "ALREADYIMPORTED",
            ErrorCode::NotInClosed => "NOTINCLOSED",
            ErrorCode::BadExit => "BADEXIT",
            ErrorCode::DivisionByZero => "DIVISIONBYZERO",
            ErrorCode::LoopSkipped => "LOOPSKIPPED",
            ErrorCode::UnusedVariable => "UNUSEDVARIABLE",
            ErrorCode::MissingExport => "MISSINGEXPORT",
            ErrorCode::MissingReturn => "MISSINGRETURN",
            ErrorCode::CompilerFailure => "COMPILERFAILURE",
        }
    }

    /// Minimum warning level at which a warning with this code is emitted.
    pub fn warning_level(self) -> u8 {
        match self {
            ErrorCode::UnusedVariable => 3,
            ErrorCode::LoopSkipped => 2,
            ErrorCode::MissingReturn => 4,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub filename: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.filename {
            f.write_str(name)?;
            if let Some(line) = self.line {
                write!(f, "({})", line)?;
            }
            f.write_str(": ")?;
        } else if let Some(line) = self.line {
            write!(f, "({}): ", line)?;
        }
        write!(f, "{} {}: {}", self.severity, self.code, self.message)
    }
}

/// Collector for one compilation. Warnings below the configured level are
/// discarded at the door; `warn_as_error` folds the rest into the error
/// count.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    warn_level: u8,
    warn_as_error: bool,
    filename: Option<String>,
    errors: usize,
    warnings: usize,
}

impl Diagnostics {
    pub fn new(warn_level: u8, warn_as_error: bool) -> Self {
        Diagnostics {
            items: Vec::new(),
            warn_level,
            warn_as_error,
            filename: None,
            errors: 0,
            warnings: 0,
        }
    }

    /// Filename attached to subsequently reported diagnostics.
    pub fn set_filename(&mut self, filename: Option<String>) {
        self.filename = filename;
    }

    pub fn error(&mut self, code: ErrorCode, line: Option<u32>, message: impl Into<String>) {
        self.errors += 1;
        self.items.push(Diagnostic {
            code,
            severity: Severity::Error,
            filename: self.filename.clone(),
            line,
            message: message.into(),
        });
    }

    pub fn warning(&mut self, code: ErrorCode, line: Option<u32>, message: impl Into<String>) {
        if self.warn_level < code.warning_level() {
            return;
        }
        self.warnings += 1;
        self.items.push(Diagnostic {
            code,
            severity: Severity::Warning,
            filename: self.filename.clone(),
            line,
            message: message.into(),
        });
    }

    pub fn info(&mut self, code: ErrorCode, line: Option<u32>, message: impl Into<String>) {
        self.items.push(Diagnostic {
            code,
            severity: Severity::Info,
            filename: self.filename.clone(),
            line,
            message: message.into(),
        });
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Errors counted for the exit status; includes warnings when
    /// `warn_as_error` is on.
    pub fn error_count(&self) -> usize {
        if self.warn_as_error {
            self.errors + self.warnings
        } else {
            self.errors
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// The closing line printed after a failed compile.
    pub fn summary(&self) -> String {
        format!(
            "*** {} errors found. Compilation stopped.",
            self.error_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_level_filter() {
        let mut diags = Diagnostics::new(2, false);
        diags.warning(ErrorCode::UnusedVariable, Some(10), "never used"); // level 3
        diags.warning(ErrorCode::LoopSkipped, Some(20), "zero trips"); // level 2
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.items().len(), 1);
    }

    #[test]
    fn test_warn_as_error_counts() {
        let mut diags = Diagnostics::new(4, true);
        diags.warning(ErrorCode::MissingExport, None, "never defined");
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);

        let mut diags = Diagnostics::new(4, false);
        diags.warning(ErrorCode::MissingExport, None, "never defined");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_display_with_location() {
        let mut diags = Diagnostics::new(4, false);
        diags.set_filename(Some("prog.cml".to_string()));
        diags.error(ErrorCode::TypeMismatch, Some(30), "cannot mix types");
        assert_eq!(
            diags.items()[0].to_string(),
            "prog.cml(30): error TYPEMISMATCH: cannot mix types"
        );
    }

    #[test]
    fn test_summary() {
        let mut diags = Diagnostics::new(4, false);
        diags.error(ErrorCode::UndefinedVariable, Some(1), "A#");
        diags.error(ErrorCode::BadExit, Some(2), "EXIT outside LOOP");
        assert_eq!(diags.summary(), "*** 2 errors found. Compilation stopped.");
    }
}
