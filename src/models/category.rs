use serde::{Deserialize, Serialize};

/// Closed set of waste-type labels.
///
/// The variant order doubles as the class-index order of the
/// classification model's output layer, so `Category::ALL[argmax]`
/// maps a prediction back to its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Paper,
    Cardboard,
    Biological,
    Metal,
    Plastic,
    #[serde(rename = "Green-glass")]
    GreenGlass,
    #[serde(rename = "Brown-glass")]
    BrownGlass,
    #[serde(rename = "White-glass")]
    WhiteGlass,
    Clothes,
    Shoes,
    Batteries,
    Trash,
}

/// Presentation attributes for a category, indexed by tag instead of
/// dispatched on label strings.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CategoryInfo {
    pub label: &'static str,
    pub icon: &'static str,
    /// Accent gradient as a hex color pair.
    pub accent: [&'static str; 2],
}

const INFO: [CategoryInfo; 12] = [
    CategoryInfo { label: "Paper", icon: "newspaper.fill", accent: ["FFFFFF", "9E9E9E"] },
    CategoryInfo { label: "Cardboard", icon: "box.truck.fill", accent: ["D2B48C", "A0522D"] },
    CategoryInfo { label: "Biological", icon: "leaf.fill", accent: ["11998e", "38ef7d"] },
    CategoryInfo { label: "Metal", icon: "gear", accent: ["bdc3c7", "2c3e50"] },
    CategoryInfo { label: "Plastic", icon: "drop.fill", accent: ["667eea", "764ba2"] },
    CategoryInfo { label: "Green-glass", icon: "wineglass.fill", accent: ["56ab2f", "a8e063"] },
    CategoryInfo { label: "Brown-glass", icon: "wineglass.fill", accent: ["8D6E63", "5D4037"] },
    CategoryInfo { label: "White-glass", icon: "wineglass.fill", accent: ["E0F7FA", "B2EBF2"] },
    CategoryInfo { label: "Clothes", icon: "tshirt.fill", accent: ["ff9a9e", "fecfef"] },
    CategoryInfo { label: "Shoes", icon: "shoe.fill", accent: ["29323c", "485563"] },
    CategoryInfo { label: "Batteries", icon: "battery.100.bolt", accent: ["ff6a00", "ee0979"] },
    CategoryInfo { label: "Trash", icon: "trash.fill", accent: ["304352", "d7d2cc"] },
];

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Paper,
        Category::Cardboard,
        Category::Biological,
        Category::Metal,
        Category::Plastic,
        Category::GreenGlass,
        Category::BrownGlass,
        Category::WhiteGlass,
        Category::Clothes,
        Category::Shoes,
        Category::Batteries,
        Category::Trash,
    ];

    /// Class index in the model's output layer.
    pub fn index(self) -> usize {
        Category::ALL.iter().position(|&c| c == self).unwrap_or(0)
    }

    pub fn from_index(idx: usize) -> Option<Category> {
        Category::ALL.get(idx).copied()
    }

    pub fn info(self) -> &'static CategoryInfo {
        &INFO[self.index()]
    }

    pub fn label(self) -> &'static str {
        self.info().label
    }

    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL
            .iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
            .copied()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
