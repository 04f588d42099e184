//! Stages connected output to input.

use log::{debug, warn};

use super::OutputPlugin;
use crate::error::PluginError;

/// An ordered list of plugins where each stage's output feeds the next.
///
/// The chain is itself an [`OutputPlugin`]: data handed to it goes to the
/// first stage. Whatever the last stage produces is dropped unless the chain
/// was built with [`keep_output`](Self::keep_output), in which case it is
/// the chain's output until taken.
pub struct PluginChain {
    name: String,
    stages: Vec<Box<dyn OutputPlugin>>,
    keep_output: bool,
    output: Vec<u8>,
    discarded: u64,
}

impl PluginChain {
    pub fn new(stages: Vec<Box<dyn OutputPlugin>>) -> Result<Self, PluginError> {
        if stages.is_empty() {
            return Err(PluginError::EmptyChain);
        }
        let name = stages
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(" -> ");
        Ok(Self {
            name,
            stages,
            keep_output: false,
            output: Vec::new(),
            discarded: 0,
        })
    }

    /// A chain with a single stage.
    pub fn single(stage: impl OutputPlugin + 'static) -> Self {
        Self {
            name: stage.name().to_string(),
            stages: vec![Box::new(stage)],
            keep_output: false,
            output: Vec::new(),
            discarded: 0,
        }
    }

    /// Buffer the last stage's output for [`take_output`](OutputPlugin::take_output).
    ///
    /// Only for chains whose consumer takes the output, such as a chain used
    /// as a stage of another chain.
    pub fn keep_output(mut self) -> Self {
        self.keep_output = true;
        self
    }

    /// Bytes produced by the last stage and dropped because nobody takes them.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage, moving output forward. `finish` selects flush over process.
    fn run(&mut self, finish: bool) -> Result<(), PluginError> {
        let mut carried: Vec<u8> = Vec::new();
        let mut first_error = None;

        for (i, stage) in self.stages.iter_mut().enumerate() {
            if i > 0 && !carried.is_empty() {
                stage.add_data(&carried);
            }
            let result = if finish {
                stage.flush()
            } else {
                stage.process_data()
            };
            if let Err(e) = result {
                // Later stages still get what was produced before the error.
                first_error.get_or_insert(e);
            }
            carried = stage.take_output();
        }
        if self.keep_output {
            self.output.extend_from_slice(&carried);
        } else if !carried.is_empty() {
            if self.discarded == 0 {
                debug!("[PluginChain] {}: last stage output is not consumed", self.name);
            }
            self.discarded += carried.len() as u64;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl OutputPlugin for PluginChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_data(&mut self, data: &[u8]) {
        if let Some(first) = self.stages.first_mut() {
            first.add_data(data);
        }
    }

    fn process_data(&mut self) -> Result<(), PluginError> {
        self.run(false)
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    fn flush(&mut self) -> Result<(), PluginError> {
        self.run(true)
    }
}

impl Drop for PluginChain {
    fn drop(&mut self) {
        if let Err(e) = self.run(true) {
            warn!("[PluginChain] {}: flush on close failed: {}", self.name, e);
        }
    }
}
