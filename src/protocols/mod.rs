//! Wire formats. Everything here is pure: bytes in, typed values out.

pub mod a2s;
pub mod rcon;
