mod sub;

pub use sub::*;
