mod accident;

pub use accident::{
    AccidentImage, AccidentLocation, AccidentReport, AccidentStatus, ApplyDecision,
    CreateAccident, Decision, DecisionSource, DispatchState, ImageFormat, LocationSource,
};
