pub mod batch;
pub mod citations;
pub mod domain_strength;
pub mod envelope;
pub mod errors;
pub mod model;
pub mod providers;
pub mod scores;
pub mod segments;
pub mod urlnorm;
pub mod window;
