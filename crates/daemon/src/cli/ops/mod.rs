pub mod cat;
pub mod ls;
#[cfg(feature = "fuse")]
pub mod mount;
pub mod stats;
pub mod version;

crate::command_enum! {
    #[cfg(feature = "fuse")]
    (Mount, mount::Mount),
    (Ls, ls::Ls),
    (Cat, cat::Cat),
    (Stats, stats::Stats),
    (Version, version::Version),
}
