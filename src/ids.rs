//! Type-safe ID newtypes for engine entities
//!
//! All IDs are opaque strings wrapped in newtypes for compile-time safety.
//! Backend-minted ids are loaded with `from_string`; locally minted ids
//! (optimistic sends) use `new()` which generates a UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to define a type-safe ID newtype
macro_rules! define_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string (ids minted by the backend)
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

// Conversations and their participants
define_id!(ConversationId, "Unique identifier for a conversation thread (may rotate for the same participant)");
define_id!(ParticipantId, "Stable identity of the human on the other end of a conversation");
define_id!(MessageId, "Unique identifier for a message within a conversation");

// Pipeline records referenced from conversations
define_id!(UserId, "Unique identifier for an internal user (assignment target)");
define_id!(ClientId, "Unique identifier for a client record");
define_id!(TagId, "Unique identifier for a conversation tag");
