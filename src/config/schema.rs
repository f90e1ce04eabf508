use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A run configuration, as read from TOML.
///
/// ```toml
/// [run]
/// passes = ["braces", "stack-to-heap", "instrument"]
///
/// [instrument]
/// mode = "pointer"
///
/// [stack_to_heap]
/// probability = 50
/// seed = 7
/// ```
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct RunConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub instrument: InstrumentSection,
    #[serde(default)]
    pub mutate: MutateSection,
    #[serde(default)]
    pub stack_to_heap: StackToHeapSection,
    #[serde(default)]
    pub output: OutputSection,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.run.passes.is_empty() {
            issues.push(ValidationIssue::EmptyPassList);
        }

        let mut seen = Vec::new();
        for pass in &self.run.passes {
            if seen.contains(pass) {
                issues.push(ValidationIssue::DuplicatePass(*pass));
            } else {
                seen.push(*pass);
            }
        }

        if self.stack_to_heap.probability > 100 {
            issues.push(ValidationIssue::OutOfRange {
                field: "stack_to_heap.probability",
                value: self.stack_to_heap.probability as u64,
                max: 100,
            });
        }

        if self.runs(PassName::Mutate) && self.mutate.targets.is_empty() {
            issues.push(ValidationIssue::InvalidCombo {
                message: "mutate pass selected with no targets".to_string(),
            });
        }

        if self.instrument.mode.is_some() && !self.runs(PassName::Instrument) {
            issues.push(ValidationIssue::InvalidCombo {
                message: "instrument.mode is set but the instrument pass is not selected"
                    .to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn runs(&self, pass: PassName) -> bool {
        self.run.passes.contains(&pass)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RunSection {
    #[serde(default = "default_passes")]
    pub passes: Vec<PassName>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            passes: default_passes(),
        }
    }
}

fn default_passes() -> Vec<PassName> {
    vec![PassName::Braces, PassName::Instrument]
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PassName {
    Braces,
    Instrument,
    Mutate,
    StackToHeap,
}

impl PassName {
    pub const ALL: [PassName; 4] = [
        PassName::Braces,
        PassName::Instrument,
        PassName::Mutate,
        PassName::StackToHeap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PassName::Braces => "braces",
            PassName::Instrument => "instrument",
            PassName::Mutate => "mutate",
            PassName::StackToHeap => "stack-to-heap",
        }
    }
}

impl fmt::Display for PassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PassName::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown pass '{s}'"))
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct InstrumentSection {
    /// Value-flow logging mode; `None` logs declarations and sites only
    #[serde(default)]
    pub mode: Option<InstrumentMode>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentMode {
    ArrayIndex,
    PointerIndex,
    ArrayPointerIndex,
    Memory,
    Pointer,
    Integer,
    Divider,
    Init,
}

impl InstrumentMode {
    pub const ALL: [InstrumentMode; 8] = [
        InstrumentMode::ArrayIndex,
        InstrumentMode::PointerIndex,
        InstrumentMode::ArrayPointerIndex,
        InstrumentMode::Memory,
        InstrumentMode::Pointer,
        InstrumentMode::Integer,
        InstrumentMode::Divider,
        InstrumentMode::Init,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentMode::ArrayIndex => "array-index",
            InstrumentMode::PointerIndex => "pointer-index",
            InstrumentMode::ArrayPointerIndex => "array-pointer-index",
            InstrumentMode::Memory => "memory",
            InstrumentMode::Pointer => "pointer",
            InstrumentMode::Integer => "integer",
            InstrumentMode::Divider => "divider",
            InstrumentMode::Init => "init",
        }
    }
}

impl fmt::Display for InstrumentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstrumentMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown instrument mode '{s}'"))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MutateSection {
    #[serde(default = "default_targets")]
    pub targets: Vec<MutationTarget>,
}

impl Default for MutateSection {
    fn default() -> Self {
        Self {
            targets: default_targets(),
        }
    }
}

fn default_targets() -> Vec<MutationTarget> {
    vec![MutationTarget::ArrayIndex, MutationTarget::Pointer]
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MutationTarget {
    ArrayIndex,
    Pointer,
    Integer,
}

impl MutationTarget {
    pub const ALL: [MutationTarget; 3] = [
        MutationTarget::ArrayIndex,
        MutationTarget::Pointer,
        MutationTarget::Integer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationTarget::ArrayIndex => "array-index",
            MutationTarget::Pointer => "pointer",
            MutationTarget::Integer => "integer",
        }
    }
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MutationTarget::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown mutation target '{s}'"))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StackToHeapSection {
    /// Percent chance (0-100) that an eligible array is relocated
    #[serde(default = "default_probability")]
    pub probability: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_true")]
    pub free_on_return: bool,
}

impl Default for StackToHeapSection {
    fn default() -> Self {
        Self {
            probability: default_probability(),
            seed: 0,
            free_on_return: true,
        }
    }
}

fn default_probability() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct OutputSection {
    /// Re-parse rewritten files and warn about new syntax errors
    #[serde(default)]
    pub validate: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyPassList,
    DuplicatePass(PassName),
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
    InvalidCombo {
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPassList => write!(f, "run.passes selects no passes"),
            ValidationIssue::DuplicatePass(pass) => {
                write!(f, "pass '{pass}' is listed more than once")
            }
            ValidationIssue::OutOfRange { field, value, max } => {
                write!(f, "{field} = {value} is out of range (0-{max})")
            }
            ValidationIssue::InvalidCombo { message } => {
                write!(f, "invalid configuration: {message}")
            }
        }
    }
}
