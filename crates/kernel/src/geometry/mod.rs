pub mod curves;
pub mod nurbs;
pub mod point;
pub mod surfaces;
pub mod transform;
pub mod vector;
