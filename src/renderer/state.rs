//! Redundant-state filtering in front of a [`GpuSink`].

use crate::texture::TextureId;

use super::blend::{BlendState, GlState};
use super::sink::{DrawMode, GpuSink};

/// Last fixed-function state and blend equation sent to the sink.
#[derive(Debug, Default)]
pub struct StateSystem {
    state: Option<GlState>,
    blend: Option<BlendState>,
}

impl StateSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<GlState> {
        self.state
    }

    pub fn blend(&self) -> Option<BlendState> {
        self.blend
    }

    /// Forget what the sink holds; the next set calls always go through.
    pub fn reset(&mut self) {
        self.state = None;
        self.blend = None;
    }
}

/// What an object renderer draws through: the sink plus the state filter.
pub struct DrawTarget<'a> {
    sink: &'a mut dyn GpuSink,
    state: &'a mut StateSystem,
}

impl<'a> DrawTarget<'a> {
    pub fn new(sink: &'a mut dyn GpuSink, state: &'a mut StateSystem) -> Self {
        Self { sink, state }
    }

    pub fn max_texture_units(&self) -> u32 {
        self.sink.max_texture_units()
    }

    pub fn set_state(&mut self, state: GlState) {
        if self.state.state == Some(state) {
            return;
        }
        self.state.state = Some(state);
        self.sink.set_state(state);
    }

    pub fn set_blend_mode(&mut self, blend: BlendState) {
        if self.state.blend == Some(blend) {
            return;
        }
        self.state.blend = Some(blend);
        self.sink.set_blend_mode(blend);
    }

    pub fn bind_shader(&mut self, texture_units: u32) {
        self.sink.bind_shader(texture_units);
    }

    pub fn bind_texture(&mut self, texture: TextureId, unit: u32) {
        self.sink.bind_texture(texture, unit);
    }

    pub fn upload_vertices(&mut self, slot: usize, data: &[u8]) {
        self.sink.upload_vertices(slot, data);
    }

    pub fn upload_indices(&mut self, indices: &[u16]) {
        self.sink.upload_indices(indices);
    }

    pub fn draw(&mut self, mode: DrawMode, count: u32, start: u32, instances: u32) {
        self.sink.draw(mode, count, start, instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::blend::BlendMode;
    use crate::renderer::sink::{CommandRecorder, GpuCommand};

    #[test]
    fn test_repeated_state_is_filtered() {
        let mut sink = CommandRecorder::new(4);
        let mut state = StateSystem::new();
        {
            let mut target = DrawTarget::new(&mut sink, &mut state);
            target.set_state(GlState::for_2d());
            target.set_state(GlState::for_2d());
            target.set_blend_mode(BlendMode::Add.state(true));
            target.set_blend_mode(BlendMode::Add.state(true));
            target.set_blend_mode(BlendMode::Normal.state(true));
        }
        assert_eq!(sink.commands().len(), 3);
        assert!(matches!(sink.commands()[0], GpuCommand::SetState(_)));

        state.reset();
        DrawTarget::new(&mut sink, &mut state).set_state(GlState::for_2d());
        assert_eq!(sink.commands().len(), 4);
    }
}
