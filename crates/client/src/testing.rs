//! Scripted network for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::fetch::{Network, canonicalize};
use crate::request::Request;
use crate::response::{BasicResponse, OpaqueResponse, Response};
use fxcache_core::Error;

#[derive(Clone)]
enum Reply {
    Basic { response: BasicResponse, delay: Duration },
    Opaque(Bytes),
    Fail,
}

/// Answers requests from per-URL scripts. Unscripted URLs fail like a
/// dropped connection.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

fn key(url: &str) -> String {
    canonicalize(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string())
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replace the script for `url` with a single repeating reply.
    fn set(&self, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .insert(key(url), VecDeque::from([reply]));
    }

    /// Queue a reply; queued replies are consumed in order and the last one repeats.
    fn push(&self, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(key(url))
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &'static str) {
        self.respond_after(url, Duration::ZERO, status, body);
    }

    pub(crate) fn respond_after(&self, url: &str, delay: Duration, status: u16, body: &'static str) {
        let status = StatusCode::from_u16(status).unwrap();
        self.set(url, Reply::Basic { response: BasicResponse::new(status, body), delay });
    }

    pub(crate) fn respond_with(&self, url: &str, response: BasicResponse) {
        self.set(url, Reply::Basic { response, delay: Duration::ZERO });
    }

    pub(crate) fn queue(&self, url: &str, delay: Duration, status: u16, body: &'static str) {
        let status = StatusCode::from_u16(status).unwrap();
        self.push(url, Reply::Basic { response: BasicResponse::new(status, body), delay });
    }

    pub(crate) fn respond_opaque(&self, url: &str, body: &'static str) {
        self.set(url, Reply::Opaque(Bytes::from_static(body.as_bytes())));
    }

    pub(crate) fn fail(&self, url: &str) {
        self.set(url, Reply::Fail);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(&key(url)).copied().unwrap_or(0)
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let script = routes.get_mut(url)?;
        if script.len() > 1 { script.pop_front() } else { script.front().cloned() }
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{url}: offline")));
        }

        match self.next_reply(&url) {
            Some(Reply::Basic { response, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(Response::Basic(response))
            }
            Some(Reply::Opaque(body)) => Ok(Response::Opaque(OpaqueResponse::seal(HeaderMap::new(), body))),
            Some(Reply::Fail) | None => Err(Error::Network(format!("{url}: connection refused"))),
        }
    }
}
