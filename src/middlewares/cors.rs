use actix_cors::Cors;

pub fn create_cors() -> Cors {
    Cors::default()
        .allowed_origin_fn(|_, _req_head| {
            // Tighten the allowed origins in production deployments.
            true
        })
        .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        // The mini-app front-end sends X-Session-Token; allow any header so
        // preflights never fail on it.
        .allow_any_header()
        .max_age(3600)
}
