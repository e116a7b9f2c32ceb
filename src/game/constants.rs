/// Session-wide constants
pub mod session {
    /// Maximum players in a session roster
    pub const MAX_PLAYERS: usize = 4;
    /// Fixed frame tick rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 60.0;
    /// Round wins needed to end the session
    pub const ROUNDS_TO_WIN: u32 = 3;
}

/// Player health constants
pub mod health {
    /// Default maximum health
    pub const MAX: i32 = 100;
}

/// Lives constants
pub mod lives {
    /// Lives granted at round start
    pub const STARTING: u32 = 3;
}

/// Respawn constants
pub mod respawn {
    /// Delay before respawning after death (seconds)
    pub const DELAY: f32 = 3.0;
    /// Invincibility window after respawning (seconds)
    pub const INVINCIBILITY: f32 = 2.0;
}

/// Crown (leader indicator) constants
pub mod crown {
    /// Seconds between leader polls
    pub const POLL_INTERVAL: f32 = 0.5;
}

/// Victory constants
pub mod victory {
    /// Default target for score-based rounds
    pub const TARGET_SCORE: i32 = 10;
    /// Number of teams in team mode (team id = player id mod TEAM_COUNT)
    pub const TEAM_COUNT: u32 = 2;
}
