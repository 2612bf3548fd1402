//! # mity_core
//!
//! Deferred values and their resolution for mITyFactory synthesis.
//!
//! Construct code rarely knows every value up front: generated resource
//! names, attributes computed by the platform and outputs of other stacks
//! only exist later. This crate models those unknowns as [`Token`]s and
//! resolves property trees containing them into plain JSON.
//!
//! # Architecture
//!
//! - **TokenMap**: allocates tokens and encodes them as string markers
//! - **Prop**: property tree with token leaves
//! - **Resolver**: recursive, cycle-checked, deterministic resolution
//! - **Intrinsics**: `Ref`, `Fn::GetAtt`, `Fn::Join` and friends
//!
//! # Example
//!
//! ```rust
//! use mity_core::{intrinsics, resolve, Prop, ReferenceTable, ResolveContext, TokenMap};
//!
//! let mut tokens = TokenMap::new();
//! let bucket = tokens.computed("BucketName", |_| Ok(intrinsics::reference("Bucket")));
//! let prop = Prop::from(format!("s3://{}/logs", bucket.marker()));
//!
//! let refs = ReferenceTable::new();
//! let value = resolve(&prop, ResolveContext::new("Storage", &tokens, &refs)).unwrap();
//! assert_eq!(
//!     value,
//!     serde_json::json!({"Fn::Join": ["", ["s3://", {"Ref": "Bucket"}, "/logs"]]})
//! );
//! ```

pub mod encoding;
pub mod error;
pub mod intrinsics;
pub mod resolver;
pub mod token;
pub mod value;

pub use encoding::{Fragment, TokenMap};
pub use error::{CoreError, CoreResult};
pub use resolver::{discover, resolve, ReferenceTable, ResolveContext, Resolver};
pub use token::{Reference, ResolveFn, Token, TokenId, TokenKind};
pub use value::Prop;
