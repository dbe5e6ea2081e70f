// Domain-layer modules and shared errors/models
pub mod features {
    pub use crate::features::*;
}

pub mod composer {
    pub use crate::composer::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod proximity {
    pub use crate::proximity::*;
}

pub mod errors {
    pub use crate::errors::*;
}
