//! Language catalog and the strategy each language executes with.

use serde::{Deserialize, Serialize};

/// How code in a language is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Run directly by the embedded JavaScript interpreter.
    Direct,
    /// Type annotations stripped, then run as JavaScript.
    Stripped,
    /// Run by the hosted WebAssembly interpreter.
    Hosted,
    /// No interpreter available in this environment.
    Unsupported,
}

/// A selectable language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Java,
    Cpp,
    CSharp,
    Go,
    Rust,
    Ruby,
    Php,
}

impl Language {
    /// Every language offered to the language picker, in display order.
    pub const ALL: [Self; 10] = [
        Self::JavaScript,
        Self::TypeScript,
        Self::Python,
        Self::Java,
        Self::Cpp,
        Self::CSharp,
        Self::Go,
        Self::Rust,
        Self::Ruby,
        Self::Php,
    ];

    /// Identifier stored in a session's `language` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Ruby => "ruby",
            Self::Php => "php",
        }
    }

    /// Parse an identifier, accepting common aliases.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Some(Self::JavaScript),
            "typescript" | "ts" => Some(Self::TypeScript),
            "python" | "py" => Some(Self::Python),
            "java" => Some(Self::Java),
            "cpp" | "c++" => Some(Self::Cpp),
            "csharp" | "c#" | "cs" => Some(Self::CSharp),
            "go" | "golang" => Some(Self::Go),
            "rust" | "rs" => Some(Self::Rust),
            "ruby" | "rb" => Some(Self::Ruby),
            "php" => Some(Self::Php),
            _ => None,
        }
    }

    /// Guess the language of a file from its extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "py" => Some(Self::Python),
            "java" => Some(Self::Java),
            "cpp" | "cc" | "cxx" | "hpp" => Some(Self::Cpp),
            "cs" => Some(Self::CSharp),
            "go" => Some(Self::Go),
            "rs" => Some(Self::Rust),
            "rb" => Some(Self::Ruby),
            "php" => Some(Self::Php),
            _ => None,
        }
    }

    /// Name shown to users.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::Python => "Python",
            Self::Java => "Java",
            Self::Cpp => "C++",
            Self::CSharp => "C#",
            Self::Go => "Go",
            Self::Rust => "Rust",
            Self::Ruby => "Ruby",
            Self::Php => "PHP",
        }
    }

    /// How this language is executed here.
    pub const fn strategy(self) -> Strategy {
        match self {
            Self::JavaScript => Strategy::Direct,
            Self::TypeScript => Strategy::Stripped,
            Self::Python => Strategy::Hosted,
            _ => Strategy::Unsupported,
        }
    }

    /// Whether code in this language can be executed here.
    pub const fn is_runnable(self) -> bool {
        !matches!(self.strategy(), Strategy::Unsupported)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
