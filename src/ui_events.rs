use crate::app_state::State;
use crate::config::AnimatorConfig;

/// Messages delivered to the event loop through its proxy, mostly from the
/// page hosting the wasm build.
#[allow(unused)]
#[derive(Debug)]
pub enum UserCommand {
    /// Swap the tuning parameters and restart with a fresh layout.
    SetConfig(Box<AnimatorConfig>),
    /// New random layout for the current viewport.
    Restart,
    /// Tear the animator down for good.
    Unmount,
    StateInitialized, // Notifies App that State setup is complete
}

impl State {
    /// Applies a command. Returns whether the animation loop should be
    /// (re)started.
    pub fn process_command(&mut self, command: UserCommand) -> bool {
        match command {
            UserCommand::SetConfig(config) => {
                log::info!("Applying new animator config (seed: {:?}).", config.seed);
                self.animator_config = *config;
                self.mount_animator();
                self.animator.is_some()
            }
            UserCommand::Restart => {
                log::info!("Restarting circuit animator.");
                self.mount_animator();
                self.animator.is_some()
            }
            UserCommand::Unmount => {
                log::info!("Unmounting circuit animator.");
                self.unmount_animator();
                false
            }
            UserCommand::StateInitialized => {
                // This command is handled in App::user_event
                false
            }
        }
    }
}
