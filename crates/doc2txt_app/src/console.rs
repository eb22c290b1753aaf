use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use doc2txt_engine::{ChannelProgressSink, HarnessEvent};

/// Starts the printer thread. It exits once the returned sink is dropped.
pub fn start(total: usize) -> (ChannelProgressSink, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<HarnessEvent>();
    let width = total.to_string().len();
    let printer = thread::spawn(move || {
        let mut done = 0usize;
        for event in rx {
            if let HarnessEvent::TaskFinished { line, .. } = event {
                done += 1;
                println!("({done:>width$}/{total}) {line}");
            }
        }
    });
    (ChannelProgressSink::new(tx), printer)
}
