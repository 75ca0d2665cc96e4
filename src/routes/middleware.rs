//! Type-erased middleware and endpoints used in route descriptors.

use axum::{
    extract::Request,
    handler::Handler,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

type MiddlewareFn = dyn Fn(Request, Next) -> BoxResponseFuture + Send + Sync;

/// A request interceptor: runs before the endpoint and either short-circuits with
/// its own response or hands the request on with `next.run(req)`.
#[derive(Clone)]
pub struct Middleware {
    run: Arc<MiddlewareFn>,
}

impl Middleware {
    pub fn from_fn<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        Self {
            run: Arc::new(move |req, next| {
                let fut = f(req, next);
                Box::pin(async move { fut.await.into_response() })
            }),
        }
    }

    pub fn call(&self, req: Request, next: Next) -> BoxResponseFuture {
        (self.run)(req, next)
    }
}

/// Terminal handler of a custom route. Wraps any axum handler without state.
#[derive(Clone)]
pub struct Endpoint {
    run: Arc<dyn Fn(Request) -> BoxResponseFuture + Send + Sync>,
}

impl Endpoint {
    pub fn new<H, T>(handler: H) -> Self
    where
        H: Handler<T, ()> + Sync,
        T: 'static,
    {
        Self {
            run: Arc::new(move |req| {
                let h = handler.clone();
                Box::pin(h.call(req, ()))
            }),
        }
    }

    /// Wraps a handler that extracts `State<S>`, binding `state` now.
    pub fn with_state<H, T, S>(handler: H, state: S) -> Self
    where
        H: Handler<T, S> + Sync,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        Self {
            run: Arc::new(move |req| {
                let h = handler.clone();
                Box::pin(h.call(req, state.clone()))
            }),
        }
    }

    pub fn call(&self, req: Request) -> BoxResponseFuture {
        (self.run)(req)
    }
}

/// Wraps `route` so that `chain[0]` runs first and the endpoint runs last.
pub fn apply_chain<S>(route: MethodRouter<S>, chain: &[Middleware]) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    chain.iter().rev().fold(route, |route, mw| {
        let mw = mw.clone();
        route.layer(axum::middleware::from_fn(move |req: Request, next: Next| {
            let mw = mw.clone();
            async move { mw.call(req, next).await }
        }))
    })
}
