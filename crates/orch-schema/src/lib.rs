pub mod kv;
pub mod request;
pub mod types;

pub use kv::{FieldValues, KeyOpFieldValues, Op, fv_get};
pub use request::{AttrType, KeyType, Request, RequestError, RequestResult, RequestSchema};
pub use types::{MacAddr, PacketAction, parse_vlan};
