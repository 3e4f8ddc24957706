pub mod cors;

pub use cors::{
    cors_layer, evaluate_origin, origin_gate, request_origin, CorsDecision, OriginBlocked,
};
