// Small display helpers, mirroring the teacher's `display::hex`.

pub fn hex(data: &[u8]) -> String {
	hex::encode(data)
}
