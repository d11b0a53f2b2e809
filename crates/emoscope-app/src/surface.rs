//! Presentation capability.
//!
//! The orchestrator renders through this trait and never owns the widgets
//! behind it.

use crate::notify::Toast;
use crate::render::ResultsView;
use crate::screen::Screen;
use emoscope_hw::StreamInfo;

pub trait Surface {
    fn show_screen(&mut self, screen: Screen);

    /// Attach a live stream to the camera preview.
    fn attach_preview(&mut self, stream: &StreamInfo);

    fn show_results(&mut self, view: &ResultsView);

    fn show_toast(&mut self, toast: &Toast);

    fn hide_toast(&mut self);
}
