//! Build script for oncutf
//!
//! This build script handles platform-specific configuration:
//! - Windows: Embeds the application manifest for long path support (>260 chars)
//!
//! # Windows Long Path Support
//!
//! By default, Windows limits file paths to 260 characters (MAX_PATH).
//! A batch renamer regularly produces target paths near or past this limit,
//! so the manifest (`oncutf.manifest`) sets `longPathAware=true` which,
//! combined with the Windows 10 v1607+ registry setting, enables paths up
//! to 32,767 characters.
//!
//! This script runs automatically during `cargo build`. On non-Windows
//! platforms it does nothing.

fn main() {
    // Only compile and embed the manifest on Windows
    #[cfg(windows)]
    {
        // Use embed-resource to compile the .rc file which references the manifest
        // The .rc file uses RT_MANIFEST resource type to embed the XML manifest
        embed_resource::compile("oncutf.rc", embed_resource::NONE);

        // Instruct Cargo to re-run this build script if either file changes
        println!("cargo:rerun-if-changed=oncutf.rc");
        println!("cargo:rerun-if-changed=oncutf.manifest");
    }

    #[cfg(not(windows))]
    {
        // Nothing to embed off Windows
    }
}
