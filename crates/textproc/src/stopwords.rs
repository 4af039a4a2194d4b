//! Embedded stop-word lists.
//!
//! Both lists are lowercase and matched exactly against tokens *before*
//! stemming. The English list is the familiar high-frequency set; the
//! Indonesian list is the hand-kept supplement used for the mixed-language
//! medical corpus.

/// Common English stop words.
pub(crate) const ENGLISH: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "aren", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "isn", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off",
    "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same",
    "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which", "while",
    "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Common Indonesian stop words applied on top of the English list.
pub(crate) const INDONESIAN: &[&str] = &[
    "ada", "adalah", "agar", "akan", "anda", "atau", "bila", "bisa", "dalam", "dan", "dapat",
    "dari", "dengan", "di", "dia", "dua", "hanya", "ia", "ini", "itu", "jika", "juga", "kami",
    "ke", "kita", "maka", "masih", "mereka", "nya", "oleh", "pada", "saya", "sama", "satu",
    "sudah", "supaya", "telah", "tidak", "tiga", "untuk", "yang",
];
