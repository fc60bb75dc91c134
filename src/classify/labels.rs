/// 显示编号（模型下标 + 1）到品种名称的映射
const VARIETY_NAMES: [(usize, &str); 4] = [
    (1, "Common"),
    (2, "SL 03 336"),
    (3, "SL 03 1077"),
    (4, "SL 03 1188"),
];

/// 未知编号的占位名称
pub const UNKNOWN_VARIETY: &str = "Unknown Variety";

/// 按显示编号查找品种名称，未知编号返回 [`UNKNOWN_VARIETY`]
pub fn variety_name(display_id: usize) -> &'static str {
    VARIETY_NAMES
        .iter()
        .find(|(id, _)| *id == display_id)
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN_VARIETY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ids_map_to_names() {
        assert_eq!(variety_name(1), "Common");
        assert_eq!(variety_name(2), "SL 03 336");
        assert_eq!(variety_name(3), "SL 03 1077");
        assert_eq!(variety_name(4), "SL 03 1188");
    }

    #[test]
    fn unknown_ids_yield_sentinel() {
        for id in [0, 5, 42, usize::MAX] {
            assert_eq!(variety_name(id), UNKNOWN_VARIETY);
        }
    }
}
