/// Declares a status enum stored as its snake_case text.
macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::domain::errors::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::domain::errors::DomainError::InvalidInput(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

pub mod commission;
pub mod context;
pub mod errors;
pub mod inventory;
pub mod order;
pub mod outbox;
pub mod payment;
pub mod ports;
pub mod prescription;
pub mod withdrawal;

/// Distinguishes an operation that changed state from one that found the
/// state already in place and wrote nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    NoOp(T),
}

impl<T> Outcome<T> {
    pub fn is_noop(&self) -> bool {
        matches!(self, Outcome::NoOp(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Outcome::Applied(v) | Outcome::NoOp(v) => v,
        }
    }
}
