pub mod angle;
pub mod vec2;
pub mod vec3;
