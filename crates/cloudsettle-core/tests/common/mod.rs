use async_trait::async_trait;
use cloudsettle_core::{PollFunction, PollResult};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

/// Probe that replays a fixed script of results, repeating the last one
pub struct ScriptedProbe<T: Clone> {
    script: Mutex<VecDeque<PollResult<T>>>,
    last: Mutex<Option<PollResult<T>>>,
    calls: Mutex<Vec<Instant>>,
}

impl<T: Clone + Send> ScriptedProbe<T> {
    pub fn new(script: impl IntoIterator<Item = PollResult<T>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PollFunction for ScriptedProbe<T> {
    type Object = T;

    async fn poll(&self) -> PollResult<T> {
        self.calls.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(result) => {
                *last = Some(result.clone());
                result
            }
            None => last.clone().expect("script must not be empty"),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PollFunction for &ScriptedProbe<T> {
    type Object = T;

    async fn poll(&self) -> PollResult<T> {
        (**self).poll().await
    }
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
