pub mod cipher;
pub mod derive;
pub mod poseidon;
