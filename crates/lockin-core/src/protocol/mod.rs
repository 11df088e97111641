pub mod constants;
pub mod resource;
pub mod status;

pub use constants::*;
pub use resource::{LockinModel, ResourceId};
pub use status::{
    CanonicalOverload, CanonicalStatus, OverloadFlag, StatusFlag, decode_overload, decode_status,
};
