//! PDF object model
//!
//! The typed sum of PDF values (ISO 32000-1 Section 7.3) together with
//! insertion-ordered dictionaries, streams and indirect-reference identity.

mod dictionary;
mod id;
mod object;
mod stream;

pub use dictionary::Dictionary;
pub use id::ObjectId;
pub use object::{Object, StringFormat};
pub use stream::Stream;
