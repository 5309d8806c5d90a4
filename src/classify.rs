/// Two-bucket status classifier. Anything other than the accepted positive
/// status lands in the negative bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusClassifier {
    pub positive: &'static str,
    pub negative: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub state_label: String,
    pub state_class: &'static str,
}

impl StatusClassifier {
    pub const fn new(positive: &'static str, negative: &'static str) -> Self {
        Self { positive, negative }
    }

    pub fn classify(&self, status: &str) -> Classification {
        Classification {
            state_label: status.to_uppercase(),
            state_class: if status == self.positive {
                self.positive
            } else {
                self.negative
            },
        }
    }
}
