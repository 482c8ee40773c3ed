// Domain layer: entities, query specification and the data-access port.

pub mod model;
pub mod ports;
pub mod query;
pub mod rating;
pub mod review;
pub mod tour;
