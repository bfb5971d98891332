//! User-visible texts and keyboards.
//!
//! Every message the bot sends is built here, so the state machine only
//! decides *which* message goes out.

use crate::config::AgeBounds;
use crate::profile::{Gender, Profile, UserId};
use crate::store::SwipeAction;

use super::input::{ButtonToken, EditChoice, MenuChoice};
use super::outbound::{InlineButton, Keyboard, KeyboardButton, OutboundMessage};
use super::state::ConversationState;

pub const MATCH_ANNOUNCEMENT: &str =
    "Selamat! Anda dan pengguna lain saling suka! 🎉 Kalian sekarang match!";
pub const EXHAUSTED: &str =
    "Sepertinya sudah tidak ada calon pasangan lagi untuk saat ini. Coba lagi nanti! 😊";
pub const PROFILE_NOT_FOUND: &str =
    "Profil Anda tidak ditemukan. Mungkin Anda belum mendaftar? /start";
pub const STORE_UNAVAILABLE: &str =
    "Maaf, layanan sedang mengalami gangguan. Silakan coba lagi sebentar lagi.";
pub const SAVE_FAILED: &str =
    "Maaf, terjadi kesalahan saat menyimpan profil Anda. Silakan coba lagi nanti.";
pub const ALREADY_DECIDED: &str = "Anda sudah pernah berinteraksi dengan profil ini.";

// ── Keyboards ───────────────────────────────────────────────────────

pub fn gender_keyboard() -> Keyboard {
    Keyboard::Choices {
        rows: vec![Gender::ALL.iter().map(|g| KeyboardButton::new(g.label())).collect()],
        one_time: true,
    }
}

pub fn location_keyboard() -> Keyboard {
    Keyboard::Choices {
        rows: vec![vec![KeyboardButton::location("Bagikan Lokasi Saat Ini")]],
        one_time: true,
    }
}

pub fn main_menu_keyboard() -> Keyboard {
    Keyboard::Choices {
        rows: vec![
            vec![KeyboardButton::new(MenuChoice::FindMatch.label())],
            vec![
                KeyboardButton::new(MenuChoice::ViewProfile.label()),
                KeyboardButton::new(MenuChoice::EditProfile.label()),
            ],
        ],
        one_time: false,
    }
}

fn swipe_buttons(candidate: UserId) -> Vec<Vec<InlineButton>> {
    let token = |action| ButtonToken::Swipe {
        action,
        target: candidate,
    };
    vec![vec![
        InlineButton::new("❌ Tidak Suka", token(SwipeAction::Dislike)),
        InlineButton::new("❤️ Suka", token(SwipeAction::Like)),
    ]]
}

fn edit_buttons() -> Vec<Vec<InlineButton>> {
    [
        ("Ubah Deskripsi", EditChoice::Description),
        ("Ubah Hobi", EditChoice::Hobby),
        ("Kembali ke Menu", EditChoice::Cancel),
    ]
    .into_iter()
    .map(|(label, choice)| vec![InlineButton::new(label, ButtonToken::Edit(choice))])
    .collect()
}

// ── Registration ────────────────────────────────────────────────────

pub fn welcome_new(to: UserId, display_name: Option<&str>) -> OutboundMessage {
    let greeting = match display_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Halo, {name}!"),
        None => "Halo!".to_string(),
    };
    OutboundMessage::text(
        to,
        format!(
            "{greeting} Selamat datang di bot kencan. Mari kita buat profil Anda.\n\n\
             Silakan pilih jenis kelamin Anda."
        ),
    )
    .with_keyboard(gender_keyboard())
}

pub fn welcome_back(to: UserId) -> OutboundMessage {
    OutboundMessage::text(
        to,
        "Selamat datang kembali! 🎉\n\n\
         Gunakan menu di bawah untuk mulai mencari pasangan atau mengelola profil Anda.",
    )
    .with_keyboard(main_menu_keyboard())
}

pub fn ask_age(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Hebat! Sekarang, berapa usia Anda?").with_keyboard(Keyboard::Remove)
}

pub fn ask_hobby(to: UserId) -> OutboundMessage {
    OutboundMessage::text(
        to,
        "OK. Apa hobi utama Anda? (Contoh: Membaca, Olahraga, Nonton Film)",
    )
}

pub fn ask_location(to: UserId) -> OutboundMessage {
    OutboundMessage::text(
        to,
        "Hobi yang menarik! Sekarang, silakan bagikan lokasi Anda agar kami bisa \
         menemukan pasangan di sekitar Anda.",
    )
    .with_keyboard(location_keyboard())
}

pub fn ask_photo(to: UserId) -> OutboundMessage {
    OutboundMessage::text(
        to,
        "Lokasi diterima! Terakhir, unggah foto terbaik Anda untuk profil.",
    )
    .with_keyboard(Keyboard::Remove)
}

pub fn ask_description(to: UserId) -> OutboundMessage {
    OutboundMessage::text(
        to,
        "Foto yang bagus! Sekarang tulis deskripsi singkat tentang diri Anda.",
    )
}

pub fn registered(to: UserId) -> OutboundMessage {
    OutboundMessage::text(
        to,
        "Pendaftaran selesai! Profil Anda telah dibuat. ✨\n\n\
         Sekarang Anda bisa mulai mencari pasangan atau melihat profil Anda.",
    )
    .with_keyboard(main_menu_keyboard())
}

pub fn already_registered(to: UserId) -> OutboundMessage {
    OutboundMessage::text(
        to,
        "Profil Anda sudah terdaftar. Ketik /start untuk membuka menu utama.",
    )
    .with_keyboard(Keyboard::Remove)
}

// ── Menu, profile, matching ─────────────────────────────────────────

/// Card for a candidate in the swipe loop, with like/dislike buttons.
pub fn candidate_card(to: UserId, candidate: &Profile) -> OutboundMessage {
    let caption = format!(
        "🚻 {}, {} tahun\n🎨 Hobi: {}\n\n📝 Deskripsi:\n{}",
        candidate.gender, candidate.age, candidate.hobby, candidate.description
    );
    OutboundMessage::text(to, caption)
        .with_photo(candidate.photo_ref.clone())
        .with_inline_buttons(swipe_buttons(candidate.user_id))
}

/// The user's own profile.
pub fn own_profile(to: UserId, profile: &Profile) -> OutboundMessage {
    let caption = format!(
        "Profil Anda\n\n🚻 Gender: {}\n🎂 Usia: {} tahun\n🎨 Hobi: {}\n\n📝 Deskripsi:\n{}",
        profile.gender, profile.age, profile.hobby, profile.description
    );
    OutboundMessage::text(to, caption)
        .with_photo(profile.photo_ref.clone())
        .with_keyboard(main_menu_keyboard())
}

pub fn decision_ack(to: UserId, action: SwipeAction) -> OutboundMessage {
    let text = match action {
        SwipeAction::Like => "(Anda menyukai profil ini ❤️)",
        SwipeAction::Dislike => "(Anda melewati profil ini ❌)",
    };
    OutboundMessage::text(to, text)
}

pub fn exhausted(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, EXHAUSTED).with_keyboard(main_menu_keyboard())
}

pub fn edit_menu(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Apa yang ingin Anda ubah?").with_inline_buttons(edit_buttons())
}

pub fn ask_new_description(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Silakan kirim deskripsi baru Anda.")
}

pub fn ask_new_hobby(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Silakan kirim hobi baru Anda.")
}

pub fn edit_cancelled(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Anda kembali di menu utama.").with_keyboard(main_menu_keyboard())
}

pub fn description_updated(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Deskripsi profil Anda telah berhasil diperbarui!")
        .with_keyboard(main_menu_keyboard())
}

pub fn hobby_updated(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Hobi Anda telah berhasil diperbarui!")
        .with_keyboard(main_menu_keyboard())
}

// ── Fallbacks ───────────────────────────────────────────────────────

pub fn cancelled(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Proses dibatalkan. Ketik /start untuk memulai lagi.")
        .with_keyboard(Keyboard::Remove)
}

pub fn unknown_command(to: UserId) -> OutboundMessage {
    OutboundMessage::text(to, "Maaf, saya tidak mengerti perintah itu. Coba /start.")
}

pub fn plain(to: UserId, text: &str) -> OutboundMessage {
    OutboundMessage::text(to, text)
}

/// Prompt re-emitted when input doesn't match what `state` expects.
pub fn reprompt(to: UserId, state: ConversationState, bounds: AgeBounds) -> OutboundMessage {
    use ConversationState::*;
    match state {
        Gender => OutboundMessage::text(to, "Silakan pilih jenis kelamin Anda: Pria atau Wanita.")
            .with_keyboard(gender_keyboard()),
        Age => OutboundMessage::text(
            to,
            format!(
                "Mohon masukkan usia yang valid (angka antara {}-{}).",
                bounds.min, bounds.max
            ),
        ),
        Hobby => OutboundMessage::text(
            to,
            "Apa hobi utama Anda? (Contoh: Membaca, Olahraga, Nonton Film)",
        ),
        Location => OutboundMessage::text(
            to,
            "Silakan bagikan lokasi Anda dengan tombol di bawah.",
        )
        .with_keyboard(location_keyboard()),
        Photo => OutboundMessage::text(to, "Silakan unggah foto terbaik Anda untuk profil."),
        Description => {
            OutboundMessage::text(to, "Silakan tulis deskripsi singkat tentang diri Anda.")
        }
        Menu => OutboundMessage::text(to, "Pilihan tidak valid. Silakan gunakan tombol di bawah.")
            .with_keyboard(main_menu_keyboard()),
        Matching { candidate } => OutboundMessage::text(
            to,
            "Silakan pilih ❤️ Suka atau ❌ Tidak Suka untuk profil ini.",
        )
        .with_inline_buttons(swipe_buttons(candidate)),
        EditChoice => edit_menu(to),
        EditDescription => ask_new_description(to),
        EditHobby => ask_new_hobby(to),
        Start | End => OutboundMessage::text(to, "Ketik /start untuk memulai."),
    }
}
