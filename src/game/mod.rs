pub mod constants;
pub mod crown;
pub mod match_result;
pub mod player;
pub mod respawn;
pub mod victory;
