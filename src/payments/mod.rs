mod paypal;
mod stripe;

pub use paypal::*;
pub use stripe::*;
