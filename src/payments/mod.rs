mod mercadopago;

pub use mercadopago::*;
