//! Demo channels and procedures served by the node binary

use serde::{Deserialize, Serialize};
use serde_json::Value;
use statesync_server::{ChannelDef, ChannelHandle, SyncServer, Validator};
use tracing::info;

/// Object-valued demo channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub val1: f64,
    pub val2: bool,
}

/// Handles to the demo channels
pub struct Demo {
    pub count: ChannelHandle<i64>,
    pub profile: ChannelHandle<Profile>,
    pub locked: ChannelHandle<bool>,
    pub flag: ChannelHandle<bool>,
}

impl Demo {
    /// One-line summary for the periodic state log
    pub fn summary(&self) -> String {
        format!(
            "count={} profile=({}, {}) locked={} flag={}",
            self.count.get(),
            self.profile.get().val1,
            self.profile.get().val2,
            self.locked.get(),
            self.flag.get()
        )
    }
}

/// Register the demo channels and procedures on `server`
pub fn register(server: &SyncServer) -> anyhow::Result<Demo> {
    let channels = server.channels();

    let count = channels.register(ChannelDef::<i64>::schema("count", 100))?;

    let profile = channels.register(
        ChannelDef::new(
            "profile",
            Validator::<Profile>::schema().refine(|p| p.val1.is_finite(), "val1 must be finite"),
            Profile::default(),
        )
        .post_commit(|p| {
            info!("Profile committed: val1={} val2={}", p.val1, p.val2);
            Ok(())
        }),
    )?;

    let locked = channels.register(ChannelDef::<bool>::schema("locked", false))?;

    let guard = locked.clone();
    let flag = channels.register(
        ChannelDef::<bool>::schema("flag", false).pre_commit(move |next| !(*next && guard.get())),
    )?;

    let procedures = server.procedures();
    procedures.register_sync("echo", |v: Value| Ok::<_, String>(v))?;
    procedures.register_sync("fail", |_: Value| Err::<Value, _>("boom"))?;
    procedures.register_sync("add", |(a, b): (i64, i64)| Ok::<_, String>(a + b))?;

    Ok(Demo {
        count,
        profile,
        locked,
        flag,
    })
}
