use std::cell::OnceCell;

use rand::RngCore;

use crate::error::{NetworkError, Result};
use crate::initializer::{DataType, WeightInitStrategy};
use crate::layers::{Layer, Shape};

#[derive(Debug)]
struct Entry {
    layer: Layer,
    shape: OnceCell<Shape>,
}

/// Append-only ordered list of layers.
///
/// A layer's output shape is a function of its own hyperparameters and the
/// shape of the layer before it, so shapes are resolved lazily and memoized:
/// appending never invalidates an earlier layer's shape.
#[derive(Debug, Default)]
pub struct Sequence {
    entries: Vec<Entry>,
}

/// Read-only view of a layer's neighbours during shape resolution
#[derive(Debug, Clone, Copy)]
pub struct Neighbors<'a> {
    sequence: &'a Sequence,
    index: usize,
}

impl<'a> Neighbors<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Output shape of the layer at `index - 1`
    pub fn previous_shape(&self) -> Result<Shape> {
        if self.index == 0 {
            return Err(NetworkError::Configuration(
                "the first layer has no predecessor, start the sequence with an Input layer".to_string(),
            ));
        }
        self.sequence.output_shape(self.index - 1)
    }

    pub fn has_successor(&self) -> bool {
        self.index + 1 < self.sequence.len()
    }

    /// Fails unless a layer follows this one
    pub fn require_successor(&self, kind: &str) -> Result<()> {
        if self.has_successor() {
            Ok(())
        } else {
            Err(NetworkError::Configuration(format!(
                "{kind} at index {} must be followed by another layer",
                self.index
            )))
        }
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: impl Into<Layer>) {
        self.entries.push(Entry {
            layer: layer.into(),
            shape: OnceCell::new(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.entries.get(index).map(|entry| &entry.layer)
    }

    /// Mutable access to a layer. Its shape and every shape after it are
    /// resolved again on the next query, since the caller may change hyperparameters.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Layer> {
        if index < self.entries.len() {
            self.invalidate_shapes(index);
        }
        self.entries.get_mut(index).map(|entry| &mut entry.layer)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Layer> + ExactSizeIterator {
        self.entries.iter().map(|entry| &entry.layer)
    }

    /// Like `get_mut`, forgets every resolved shape
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Layer> + ExactSizeIterator {
        self.invalidate_shapes(0);
        self.entries.iter_mut().map(|entry| &mut entry.layer)
    }

    fn invalidate_shapes(&mut self, from: usize) {
        for entry in self.entries.iter_mut().skip(from) {
            entry.shape.take();
        }
    }

    fn entry(&self, index: usize) -> Result<&Entry> {
        self.entries.get(index).ok_or_else(|| {
            NetworkError::Configuration(format!(
                "no layer at index {index}, the sequence has {} layers",
                self.len()
            ))
        })
    }

    /// Output shape of the layer at `index`
    pub fn output_shape(&self, index: usize) -> Result<Shape> {
        let entry = self.entry(index)?;
        if let Some(shape) = entry.shape.get() {
            return Ok(shape.clone());
        }

        let neighbors = Neighbors { sequence: self, index };
        let shape = entry.layer.ops().output_shape(&neighbors)?;
        log::debug!("{} ({}) at {index}: output shape {:?}", entry.layer.name(), entry.layer.kind(), shape);

        let _ = entry.shape.set(shape.clone());
        Ok(shape)
    }

    /// Shape the layer at `index` receives: its predecessor's output, or its own shape for a leading Input
    pub fn input_shape(&self, index: usize) -> Result<Shape> {
        match self.entry(index)?.layer {
            Layer::Input(_) if index == 0 => self.output_shape(0),
            _ => Neighbors { sequence: self, index }.previous_shape(),
        }
    }

    pub fn generate_weights(
        &mut self,
        index: usize,
        strategy: WeightInitStrategy,
        dtype: DataType,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let input_shape = self.input_shape(index)?;
        let layer = &mut self.entries[index].layer;
        layer.ops_mut().generate_weights(&input_shape, strategy, dtype, rng)?;
        log::debug!(
            "{} ({}) at {index}: generated {} parameters with {:?}",
            layer.name(),
            layer.kind(),
            layer.parameter_count(),
            strategy
        );
        Ok(())
    }

    /// (Re)allocates the batch buffers of the layer at `index`
    pub fn set_batch_size(&mut self, batch_size: usize, index: usize) -> Result<()> {
        let input_shape = self.input_shape(index)?;
        let output_shape = self.output_shape(index)?;
        self.entries[index]
            .layer
            .ops_mut()
            .set_batch_size(batch_size, &input_shape, &output_shape);
        Ok(())
    }
}
