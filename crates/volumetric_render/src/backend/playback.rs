use super::AssetHandle;
use crate::scene::Aabb;

/// Decode/playback engine the pipeline queries for actor state
///
/// The pipeline never interprets decoded data. It only asks for bounds and
/// playback state, and hands the asset handle back to the graphics backend.
pub trait PlaybackEngine {
    /// Advance decoding; called once per prepared frame
    fn update(&mut self);

    /// Object-space bounds of the current frame, `None` until decoded
    fn bounds(&self, asset: AssetHandle) -> Option<Aabb>;

    /// True while the asset is playing
    fn is_playing(&self, asset: AssetHandle) -> bool;

    /// Playback position in seconds
    fn current_time(&self, asset: AssetHandle) -> f32;
}
