//! Output plugins: the sinks a recording's TS packets are routed into.
//!
//! A plugin buffers whatever `add_data` hands it and does the actual work
//! (writing, remuxing, sending) in `process_data`. Plugins are composed
//! into a [`PluginChain`], where each stage's output feeds the next one.

mod chain;
mod file_writer;
mod remux;
mod udp_send;

pub use chain::PluginChain;
pub use file_writer::FileWriter;
pub use remux::{PesAssembler, PesPacket, PesRemuxer, PictureMark, PictureType, Remux};
pub use udp_send::{UdpSend, MAX_DATAGRAM_SIZE};

use crate::error::PluginError;

pub trait OutputPlugin {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Buffer `data`. Must not block or do any I/O.
    fn add_data(&mut self, data: &[u8]);

    /// Process everything buffered so far.
    fn process_data(&mut self) -> Result<(), PluginError>;

    /// Bytes produced for the next stage of a chain.
    fn take_output(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Push out anything still held back. Called before the plugin is dropped.
    fn flush(&mut self) -> Result<(), PluginError> {
        self.process_data()
    }
}

impl<P: OutputPlugin + ?Sized> OutputPlugin for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn add_data(&mut self, data: &[u8]) {
        (**self).add_data(data)
    }

    fn process_data(&mut self) -> Result<(), PluginError> {
        (**self).process_data()
    }

    fn take_output(&mut self) -> Vec<u8> {
        (**self).take_output()
    }

    fn flush(&mut self) -> Result<(), PluginError> {
        (**self).flush()
    }
}

/// Shared test sink recording what it was handed.
#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::OutputPlugin;
    use crate::error::PluginError;

    #[derive(Default)]
    pub struct Probe {
        /// Every `add_data` call, in order.
        pub chunks: Vec<Vec<u8>>,
        pub process_calls: usize,
        pub flush_calls: usize,
    }

    /// A sink whose observations outlive it.
    pub struct ProbeSink {
        name: String,
        probe: Rc<RefCell<Probe>>,
        pending: Vec<u8>,
        /// Echo processed bytes as output, for chain tests.
        passthrough: bool,
        output: Vec<u8>,
        fail: bool,
    }

    impl ProbeSink {
        pub fn new(name: &str) -> (Self, Rc<RefCell<Probe>>) {
            let probe = Rc::new(RefCell::new(Probe::default()));
            (
                Self {
                    name: name.to_string(),
                    probe: probe.clone(),
                    pending: Vec::new(),
                    passthrough: false,
                    output: Vec::new(),
                    fail: false,
                },
                probe,
            )
        }

        pub fn passthrough(mut self) -> Self {
            self.passthrough = true;
            self
        }

        pub fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl OutputPlugin for ProbeSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn add_data(&mut self, data: &[u8]) {
            self.probe.borrow_mut().chunks.push(data.to_vec());
            self.pending.extend_from_slice(data);
        }

        fn process_data(&mut self) -> Result<(), PluginError> {
            self.probe.borrow_mut().process_calls += 1;
            if self.fail {
                return Err(PluginError::io(
                    self.name.clone(),
                    std::io::Error::new(std::io::ErrorKind::Other, "probe failure"),
                ));
            }
            let data = std::mem::take(&mut self.pending);
            if self.passthrough {
                self.output.extend_from_slice(&data);
            }
            Ok(())
        }

        fn take_output(&mut self) -> Vec<u8> {
            std::mem::take(&mut self.output)
        }

        fn flush(&mut self) -> Result<(), PluginError> {
            self.probe.borrow_mut().flush_calls += 1;
            self.process_data()
        }
    }
}
