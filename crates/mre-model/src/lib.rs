pub mod catalogue;
pub mod error;
pub mod value;

pub use catalogue::{Catalogue, Constraint, VariableDefinition};
pub use error::{ModelError, Result};
pub use value::{
    Geometry, Matrix, Scalar, Series, StructuralType, StructuredValue, Table, TimeSeries,
};
