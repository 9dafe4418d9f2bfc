use snowflake::SnowflakeIdGenerator;
use std::sync::Mutex;

static ID_GENERATOR: Mutex<Option<SnowflakeIdGenerator>> = Mutex::new(None);

/// Initialise the Snowflake generator.
///
/// `machine_id` and `node_id` must each be in `0..32`.
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = ID_GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if gen.is_none() {
        *gen = Some(SnowflakeIdGenerator::new(machine_id, node_id));
    }
}

/// Next Snowflake id as a decimal string. Ids grow monotonically within a
/// process, which the scan history relies on for tie-breaking.
pub fn next_id() -> String {
    let mut gen = ID_GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let generator = gen.get_or_insert_with(|| SnowflakeIdGenerator::new(1, 1));
    generator.real_time_generate().to_string()
}
