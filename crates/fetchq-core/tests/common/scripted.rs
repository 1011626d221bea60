//! Fetch primitive whose transfers finish after a scripted number of polls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fetchq_core::{FetchHandle, Fetcher, LoadPriority};

#[derive(Debug, Clone)]
pub enum Script {
    /// Done on the `polls`-th `is_done` call with `body`.
    Succeed { polls: u32, body: Vec<u8> },
    /// Done on the `polls`-th `is_done` call with `message` as the error.
    Fail { polls: u32, message: String },
    /// `Fetcher::open` panics.
    PanicOnOpen,
    /// The `polls`-th `is_done` call panics.
    PanicOnPoll { polls: u32 },
}

impl Script {
    pub fn ok(polls: u32) -> Self {
        Script::Succeed {
            polls,
            body: b"ok".to_vec(),
        }
    }

    pub fn fail(polls: u32, message: &str) -> Self {
        Script::Fail {
            polls,
            message: message.to_string(),
        }
    }

    fn polls(&self) -> u32 {
        match self {
            Script::Succeed { polls, .. }
            | Script::Fail { polls, .. }
            | Script::PanicOnPoll { polls } => (*polls).max(1),
            Script::PanicOnOpen => 1,
        }
    }
}

#[derive(Default)]
struct Counters {
    live: AtomicUsize,
    peak_live: AtomicUsize,
    disposed: AtomicUsize,
}

pub struct ScriptedFetcher {
    default: Script,
    scripts: Mutex<HashMap<String, Script>>,
    opened: Mutex<Vec<(String, LoadPriority)>>,
    counters: Arc<Counters>,
}

impl ScriptedFetcher {
    /// Every URL succeeds after 3 polls unless scripted otherwise.
    pub fn new() -> Arc<Self> {
        Self::with_default(Script::ok(3))
    }

    pub fn with_default(default: Script) -> Arc<Self> {
        Arc::new(Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn script(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), script);
    }

    /// URLs in the order their transfers were opened.
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn priorities(&self) -> Vec<LoadPriority> {
        self.opened.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }

    /// Transfers opened but not yet done.
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.counters.peak_live.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.counters.disposed.load(Ordering::SeqCst)
    }
}

impl Fetcher for ScriptedFetcher {
    fn open(&self, url: &str, priority: LoadPriority) -> Box<dyn FetchHandle> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        self.opened
            .lock()
            .unwrap()
            .push((url.to_string(), priority));
        if let Script::PanicOnOpen = script {
            panic!("scripted panic opening {}", url);
        }
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_live.fetch_max(live, Ordering::SeqCst);
        Box::new(ScriptedHandle {
            script,
            polls: AtomicU32::new(0),
            live: AtomicBool::new(true),
            counters: Arc::clone(&self.counters),
        })
    }
}

struct ScriptedHandle {
    script: Script,
    polls: AtomicU32,
    live: AtomicBool,
    counters: Arc<Counters>,
}

impl ScriptedHandle {
    fn done(&self) -> bool {
        self.polls.load(Ordering::SeqCst) >= self.script.polls()
    }
}

impl FetchHandle for ScriptedHandle {
    fn progress(&self) -> f32 {
        let polls = self.polls.load(Ordering::SeqCst) as f32;
        (polls / self.script.polls() as f32).min(1.0)
    }

    fn is_done(&self) -> bool {
        if !self.done() {
            self.polls.fetch_add(1, Ordering::SeqCst);
        }
        let done = self.done();
        if done && self.live.swap(false, Ordering::SeqCst) {
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
        if done {
            if let Script::PanicOnPoll { .. } = self.script {
                panic!("scripted panic while polling");
            }
        }
        done
    }

    fn error(&self) -> Option<String> {
        match &self.script {
            Script::Fail { message, .. } if self.done() => Some(message.clone()),
            _ => None,
        }
    }

    fn body(&self) -> Option<Arc<[u8]>> {
        match &self.script {
            Script::Succeed { body, .. } if self.done() => Some(Arc::from(body.clone())),
            _ => None,
        }
    }

    fn dispose(&mut self) {
        self.counters.disposed.fetch_add(1, Ordering::SeqCst);
    }
}
