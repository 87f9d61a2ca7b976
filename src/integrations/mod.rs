pub mod ion;

pub use ion::{IonAsset, IonCatalog, IonClient, IonError};
