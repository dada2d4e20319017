pub mod directory;
pub mod error;
pub mod supabase;

pub use error::StoreError;
