pub mod galois;
pub mod modular;
pub mod ntt;
pub mod poly;
pub mod rns;

pub use galois::GaloisTool;
pub use modular::{Modulus, MultiplyOperand};
pub use ntt::NttTables;
pub use rns::{BaseConverter, RnsBase, RnsTool};
