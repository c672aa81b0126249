//! Runtime object model and profiling support for the tierjit compiler core.
//!
//! This crate provides:
//! - The dynamic value model (`Value`) and its representation lattice (`ValueType`)
//! - Field interning (`FieldTable`) shared by compiled code and the object model
//! - Property maps with transitions, property descriptors and objects
//! - The global object, builtins and the bounded inherited-property cache
//! - Per-function profile records written by instrumented code

pub mod builtins;
pub mod error;
pub mod field;
pub mod object;
pub mod ops;
pub mod profile;
pub mod runtime;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use field::{FieldId, FieldTable};
pub use object::{
    InheritedEntry, JsObject, MapId, ObjectRef, PropertyDescriptor, PropertyFlags,
    PropertyLookup, PropertyMap,
};
pub use ops::{BinaryOp, UnaryOp};
pub use profile::{
    CallProfile, FunctionProfile, GuardProfile, MapProfile, ProfileConfig, ProfileCounts,
    PropertyObservation, TypeRecord,
};
pub use runtime::Runtime;
pub use value::{ArrayRef, Closure, FunctionId, NativeFn, NativeFunction, Value, ValueType};
