//! Owned buffers shared between the accumulator and the pitch engine.
//!
//! The analysis window and the output-pitches slots are allocated when a
//! detection run starts and released when `EngineBuffers` is dropped, on
//! every exit path.

use log::debug;

#[derive(Debug)]
pub struct EngineBuffers {
    window: Box<[f32]>,
    output: Box<[f32]>,
}

impl EngineBuffers {
    /// Allocates a zeroed analysis window. Output slots are sized later,
    /// once the engine reports how many pitches it emits.
    pub fn with_window(window_size: usize) -> Self {
        debug!(target: "buffers", "allocating {window_size}-sample analysis window");
        Self {
            window: vec![0.0; window_size].into_boxed_slice(),
            output: Box::default(),
        }
    }

    pub fn allocate_output(&mut self, n_pitches: usize) {
        self.output = vec![0.0; n_pitches].into_boxed_slice();
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// The `chunk_size` samples starting at `index * chunk_size`.
    pub fn chunk_mut(&mut self, index: usize, chunk_size: usize) -> &mut [f32] {
        let start = index * chunk_size;
        &mut self.window[start..start + chunk_size]
    }

    /// Window as engine input, output slots as engine output.
    pub fn split(&mut self) -> (&[f32], &mut [f32]) {
        (&self.window, &mut self.output)
    }

    pub fn clear_window(&mut self) {
        self.window.fill(0.0);
    }
}

impl Drop for EngineBuffers {
    fn drop(&mut self) {
        debug!(
            target: "buffers",
            "releasing analysis window ({} samples) and {} output slots",
            self.window.len(),
            self.output.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_disjoint_slices_of_the_window() {
        let mut buffers = EngineBuffers::with_window(8);
        buffers.chunk_mut(1, 4).fill(1.0);
        assert_eq!(buffers.window(), &[0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);

        buffers.clear_window();
        assert!(buffers.window().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn output_is_sized_after_init() {
        let mut buffers = EngineBuffers::with_window(8);
        assert!(buffers.split().1.is_empty());
        buffers.allocate_output(3);
        let (input, output) = buffers.split();
        assert_eq!(input.len(), 8);
        assert_eq!(output.len(), 3);
    }
}
