use std::net::IpAddr;

use vidctrl_frame::{AnnotationMode, DrcLevel};

/// The media pipeline a [`ControlServer`](crate::ControlServer) drives.
///
/// Calls arrive on the server task, one at a time, in the order the client
/// sent them.
pub trait MediaPipeline: Send {
    /// Where the RTP stream should go. Called for every accepted client.
    fn set_dest_host(&mut self, host: IpAddr);

    /// Change capture parameters. Streaming resumes afterwards.
    fn set_resolution_framerate(&mut self, width: u16, height: u16, framerate: u16);

    fn pause(&mut self);

    fn resume(&mut self);

    /// Encoder target in bits per second.
    fn set_target_bitrate(&mut self, bitrate: u32);

    fn set_annotation_mode(&mut self, mode: AnnotationMode);

    fn set_drc_level(&mut self, level: DrcLevel);

    /// The control connection went away without being replaced.
    fn client_disconnected(&mut self) {
        self.pause();
    }
}
