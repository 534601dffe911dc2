//! A background thread that drives an `Autofiller` one step at a time.
//!
//! Commands and the worker's own "take another step" messages share one FIFO channel, so a
//! `Cancel` sent mid-search is seen after at most one more step. Results and completion come
//! back as `WorkerEvent`s on a second channel.

use std::io;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::autofill::{AutofillOptions, Autofiller};
use crate::grid::GridTemplate;
use crate::word_index::WordIndex;

/// Commands accepted by the worker.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Use an index that's already been built.
    LoadIndex(Arc<WordIndex>),
    /// Build an index from a raw `WORD;score` list.
    LoadWordList(String),
    /// Decode and validate a persisted index.
    LoadPersistedIndex(String),
    /// Start filling a grid, cancelling any search already running.
    Run {
        template: GridTemplate,
        options: AutofillOptions,
    },
    Cancel,
    Shutdown,
}

/// Events sent back by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    IndexLoaded { word_count: usize },
    /// The persisted index couldn't be used. Any previously loaded index stays in place.
    IndexLoadFailed { code: &'static str, message: String },
    /// A complete fill for `template`.
    Result { template: GridTemplate, cells: Vec<String> },
    /// The active search stopped. Sent exactly once per accepted `Run`.
    Complete,
    /// The grid in a `Run` was malformed; no search was started.
    RunRejected { code: &'static str, message: String },
}

enum Message {
    Command(WorkerCommand),
    Step(u64),
}

struct WorkerLoop {
    inbox: Sender<Message>,
    events: Sender<WorkerEvent>,
    index: Option<Arc<WordIndex>>,
    active: Option<(u64, Autofiller)>,
    next_run_id: u64,
}

impl WorkerLoop {
    fn run(mut self, messages: Receiver<Message>) {
        while let Ok(message) = messages.recv() {
            match message {
                Message::Command(WorkerCommand::Shutdown) => break,
                Message::Command(command) => self.handle_command(command),
                Message::Step(run_id) => self.step(run_id),
            }
        }

        self.cancel();
        log::debug!("Autofill worker stopped");
    }

    fn emit(&self, event: WorkerEvent) {
        // The host may have stopped listening; there's nobody left to tell.
        let _ = self.events.send(event);
    }

    fn set_index(&mut self, index: Arc<WordIndex>) {
        let word_count = index.word_count();
        self.index = Some(index);
        self.emit(WorkerEvent::IndexLoaded { word_count });
    }

    fn handle_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::LoadIndex(index) => self.set_index(index),
            WorkerCommand::LoadWordList(raw_word_list) => {
                self.set_index(Arc::new(WordIndex::build(&raw_word_list)));
            }
            WorkerCommand::LoadPersistedIndex(json) => match WordIndex::from_json(&json) {
                Ok(index) => self.set_index(Arc::new(index)),
                Err(error) => {
                    log::debug!("Rejected persisted index: {} {}", error.code(), error);
                    self.emit(WorkerEvent::IndexLoadFailed {
                        code: error.code(),
                        message: error.to_string(),
                    });
                }
            },
            WorkerCommand::Run { template, options } => self.start(template, options),
            WorkerCommand::Cancel => self.cancel(),
            WorkerCommand::Shutdown => {}
        }
    }

    fn start(&mut self, template: GridTemplate, options: AutofillOptions) {
        self.cancel();

        let Some(index) = self.index.clone() else {
            panic!("Autofill run requested before a word index was loaded");
        };

        let on_result = {
            let events = self.events.clone();
            move |template: &GridTemplate, cells: Vec<String>| {
                let _ = events.send(WorkerEvent::Result { template: template.clone(), cells });
            }
        };
        let on_complete = {
            let events = self.events.clone();
            move || {
                let _ = events.send(WorkerEvent::Complete);
            }
        };

        match Autofiller::new(index, template, options, on_result, on_complete) {
            Ok(autofiller) => {
                let run_id = self.next_run_id;
                self.next_run_id += 1;
                self.active = Some((run_id, autofiller));
                self.schedule(run_id);
            }
            Err(error) => {
                log::debug!("Rejected grid: {} {}", error.code(), error);
                self.emit(WorkerEvent::RunRejected {
                    code: error.code(),
                    message: error.to_string(),
                });
            }
        }
    }

    fn schedule(&self, run_id: u64) {
        let _ = self.inbox.send(Message::Step(run_id));
    }

    fn step(&mut self, run_id: u64) {
        let Some((active_id, autofiller)) = &mut self.active else {
            return;
        };
        // Left over from a run that's since been cancelled or replaced.
        if *active_id != run_id {
            return;
        }

        autofiller.step();

        if autofiller.is_completed() {
            self.active = None;
        } else {
            self.schedule(run_id);
        }
    }

    fn cancel(&mut self) {
        if let Some((_, mut autofiller)) = self.active.take() {
            autofiller.cancel();
        }
    }
}

/// Handle to a running autofill worker thread. Dropping it shuts the thread down.
pub struct Worker {
    commands: Sender<Message>,
    events: Receiver<WorkerEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn() -> io::Result<Worker> {
        let (commands, messages) = unbounded();
        let (event_sender, events) = unbounded();

        // Search callbacks aren't `Send`, so the loop state is only ever built on the worker thread.
        let inbox = commands.clone();
        let handle = thread::Builder::new()
            .name("autofill-worker".to_string())
            .spawn(move || {
                let worker_loop = WorkerLoop {
                    inbox,
                    events: event_sender,
                    index: None,
                    active: None,
                    next_run_id: 0,
                };
                worker_loop.run(messages);
            })?;

        Ok(Worker { commands, events, handle: Some(handle) })
    }

    pub fn send(&self, command: WorkerCommand) {
        let _ = self.commands.send(Message::Command(command));
    }

    pub fn load_index(&self, index: Arc<WordIndex>) {
        self.send(WorkerCommand::LoadIndex(index));
    }

    pub fn run(&self, template: GridTemplate, options: AutofillOptions) {
        self.send(WorkerCommand::Run { template, options });
    }

    pub fn cancel(&self) {
        self.send(WorkerCommand::Cancel);
    }

    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                let message = payload
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| payload.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
                log::error!("Autofill worker thread panicked: {message}");
            }
        }
    }
}
