//! Client-side password policy checks, mirroring what the server enforces.

use derive_more::Display;

const SPECIAL: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

/// Which character classes a password must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordRequirements {
    pub min_length: usize,
    pub require_lower: bool,
    pub require_upper: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_lower: true,
            require_upper: true,
            require_digit: true,
            require_special: false,
        }
    }
}

impl PasswordRequirements {
    /// Human-readable summary, e.g. `"At least 8 characters, One number"`.
    #[must_use]
    pub fn text(&self) -> String {
        let mut parts = vec![format!("At least {} characters", self.min_length)];
        if self.require_lower {
            parts.push("One lowercase letter".into());
        }
        if self.require_upper {
            parts.push("One uppercase letter".into());
        }
        if self.require_digit {
            parts.push("One number".into());
        }
        if self.require_special {
            parts.push("One special character".into());
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordValidation {
    pub is_valid: bool,
    /// One message per unmet requirement, in a stable order.
    pub errors: Vec<String>,
    pub requirements_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum PasswordStrength {
    #[display("weak")]
    Weak,
    #[display("medium")]
    Medium,
    #[display("strong")]
    Strong,
}

struct Classes {
    lower: bool,
    upper: bool,
    digit: bool,
    special: bool,
}

impl Classes {
    fn of(password: &str) -> Self {
        Self {
            lower: password.chars().any(|c| c.is_ascii_lowercase()),
            upper: password.chars().any(|c| c.is_ascii_uppercase()),
            digit: password.chars().any(|c| c.is_ascii_digit()),
            special: password.chars().any(|c| SPECIAL.contains(c)),
        }
    }
}

#[must_use]
pub fn validate_password(password: &str, requirements: &PasswordRequirements) -> PasswordValidation {
    let classes = Classes::of(password);
    let mut errors = Vec::new();

    if password.chars().count() < requirements.min_length {
        errors.push(format!(
            "Password must be at least {} characters long",
            requirements.min_length
        ));
    }
    if requirements.require_lower && !classes.lower {
        errors.push("Password must contain at least one lowercase letter".into());
    }
    if requirements.require_upper && !classes.upper {
        errors.push("Password must contain at least one uppercase letter".into());
    }
    if requirements.require_digit && !classes.digit {
        errors.push("Password must contain at least one number".into());
    }
    if requirements.require_special && !classes.special {
        errors.push("Password must contain at least one special character".into());
    }

    PasswordValidation {
        is_valid: errors.is_empty(),
        errors,
        requirements_text: requirements.text(),
    }
}

/// Rough strength rating for a password meter.
#[must_use]
pub fn password_strength(password: &str) -> PasswordStrength {
    let len = password.chars().count();
    if len < 6 {
        return PasswordStrength::Weak;
    }
    let classes = Classes::of(password);
    let score = [len >= 8, classes.lower, classes.upper, classes.digit, classes.special]
        .into_iter()
        .filter(|&met| met)
        .count();
    match score {
        0..=2 => PasswordStrength::Weak,
        3..=4 => PasswordStrength::Medium,
        _ => PasswordStrength::Strong,
    }
}
