use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

/// One primitive pushed by a script's `draw` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawCommand {
    Clear { color: [f32; 4] },
    Rect { position: [f32; 2], size: [f32; 2], color: [f32; 4] },
    Line { from: [f32; 2], to: [f32; 2], width: f32, color: [f32; 4] },
    Text { position: [f32; 2], text: String, color: [f32; 4] },
}

impl DrawCommand {
    pub fn clear(color: Vec4) -> Self {
        DrawCommand::Clear { color: color.to_array() }
    }

    pub fn rect(position: Vec2, size: Vec2, color: Vec4) -> Self {
        DrawCommand::Rect { position: position.to_array(), size: size.to_array(), color: color.to_array() }
    }

    pub fn line(from: Vec2, to: Vec2, width: f32, color: Vec4) -> Self {
        DrawCommand::Line { from: from.to_array(), to: to.to_array(), width, color: color.to_array() }
    }

    pub fn text(position: Vec2, text: impl Into<String>, color: Vec4) -> Self {
        DrawCommand::Text { position: position.to_array(), text: text.into(), color: color.to_array() }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DrawCommand::Clear { .. } => "clear",
            DrawCommand::Rect { .. } => "rect",
            DrawCommand::Line { .. } => "line",
            DrawCommand::Text { .. } => "text",
        }
    }
}

/// Sink for draw calls issued by scripts. The scripting layer never looks
/// behind this trait.
pub trait Renderer {
    fn viewport(&self) -> Vec2;

    fn submit(&mut self, command: DrawCommand);

    fn begin_frame(&mut self) {}

    fn end_frame(&mut self) {}
}

/// Keeps every submitted command in memory. Used headless and by the harness.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    viewport: Vec2,
    commands: Vec<DrawCommand>,
    frames: u32,
}

impl RecordingRenderer {
    pub fn new(viewport: Vec2) -> Self {
        Self { viewport, commands: Vec::new(), frames: 0 }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

impl Renderer for RecordingRenderer {
    fn viewport(&self) -> Vec2 {
        self.viewport
    }

    fn submit(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    fn begin_frame(&mut self) {
        self.frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_renderer_keeps_submission_order() {
        let mut renderer = RecordingRenderer::new(Vec2::new(320.0, 240.0));
        renderer.begin_frame();
        renderer.submit(DrawCommand::clear(Vec4::ZERO));
        renderer.submit(DrawCommand::rect(Vec2::ONE, Vec2::splat(4.0), Vec4::ONE));
        let labels: Vec<_> = renderer.commands().iter().map(DrawCommand::label).collect();
        assert_eq!(labels, vec!["clear", "rect"]);
        assert_eq!(renderer.frames(), 1);
        assert_eq!(renderer.take_commands().len(), 2);
        assert!(renderer.commands().is_empty());
    }

    #[test]
    fn draw_commands_serialize_with_kind_tag() {
        let json = serde_json::to_value(DrawCommand::line(Vec2::ZERO, Vec2::X, 2.0, Vec4::ONE)).expect("json");
        assert_eq!(json["kind"], "line");
        assert_eq!(json["width"], 2.0);
    }
}
