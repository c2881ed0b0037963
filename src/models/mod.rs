pub mod gbdt;
pub mod hybrid;
pub mod linear;
pub mod traits;

pub use gbdt::GradientBoostingRegressor;
pub use hybrid::BoostedHybridModel;
pub use linear::LinearRegression;
pub use traits::{ModelFactory, Regressor};
