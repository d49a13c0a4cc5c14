// Domain layer: the cell port and benchmark models. No threading code lives here.

pub mod model;
pub mod ports;
