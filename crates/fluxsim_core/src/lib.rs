pub mod config;
pub mod derivatives;
pub mod engine;
pub mod error;
pub mod export;
pub mod expression;
pub mod solvers;
pub mod stats;
pub mod table;
/// The `fluxsim_core` crate integrates continuous-time compartmental models
/// (metabolic flux models and the like) with a fixed-step RK4 scheme.
///
/// Key components:
/// - **Traits**: `ModelFunction` (the model plug-in point), `Steppable` (Solvers).
/// - **Engine**: `Simulation::run`, sampling on integer step counts and resuming from a
///   prior `ResultTable`.
/// - **Expression**: `ExpressionModel`, a model written as ordered `name = expression` assignments.
/// - **Stats / Export**: agreement statistics (MSPE, CCC) and timestamped CSV output.
pub mod traits;

pub use config::{RunConfig, StepPlan};
pub use derivatives::Derivatives;
pub use engine::{run, Simulation, Start};
pub use error::SimulationError;
pub use expression::ExpressionModel;
pub use table::{ResultTable, TIME_COLUMN};
pub use traits::{Evaluation, ModelFunction, Parameters, StateVars};
