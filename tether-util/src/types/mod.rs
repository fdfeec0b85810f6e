mod identifiers;
mod symmetric_key;

pub use identifiers::{DeviceId, IdScope, RegistrationId};
pub use symmetric_key::SymmetricKey;

// Just an alias for more descriptive code
pub type HubHost = String;
