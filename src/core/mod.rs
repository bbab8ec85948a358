// ─── Server Installer Core ───
// Backend for installing Minecraft server software.
//
// Architecture:
//   core/
//     version/    Vendor catalogs, Mojang manifest, version ordering
//     downloader/ Streaming cancellable downloads into temp dirs
//     java/       Java requirement table, runtime provisioning, probing
//     loaders/    Per-flavor resolve + finalize (Vanilla .. NeoForge)
//     launch/     Subprocess runner for installer jars
//     server/     Install config, server files, pipeline orchestrator
//     state/      Settings file + service wiring

pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod loaders;
pub mod progress;
pub mod server;
pub mod state;
pub mod version;
