// cl_inventory.rs: the inventory screen

use q2core_common::common::SizeBuf;
use q2core_common::q_shared::MAX_ITEMS;
use q2core_renderer::r_backend::RenderBackend;
use q2core_renderer::Renderer;

use crate::keys::{keynum_to_string, KeyBindings};

pub const DISPLAY_ITEMS: usize = 17;

/// Font index of the selection cursor.
const CURSOR_CHAR: i32 = 15;

/// What the inventory screen needs from the rest of the client.
pub struct InventoryView<'a> {
    /// `STAT_SELECTED_ITEM` of the current frame.
    pub selected: i32,
    /// Item names from the item config strings, indexed by item number.
    pub item_names: &'a [String],
    pub bindings: &'a KeyBindings,
    /// Real time in seconds; the cursor blinks at 5 Hz.
    pub realtime: f32,
    /// HUD scale factor.
    pub scale: f32,
    pub width: i32,
    pub height: i32,
}

/// One listed item, already formatted as font indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub item: usize,
    pub text: Vec<u8>,
    pub selected: bool,
}

/// Item counts sent by the server.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub counts: [i32; MAX_ITEMS],
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            counts: [0; MAX_ITEMS],
        }
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one short per item.
    pub fn parse_inventory(&mut self, msg: &mut SizeBuf) {
        for count in self.counts.iter_mut() {
            *count = msg.read_short();
        }
    }

    /// The rows visible on screen: up to `DISPLAY_ITEMS` held items,
    /// scrolled to keep the selection near the middle. Each row reads
    /// `hotkey count name`. Unselected rows use the alternate font half.
    pub fn rows(&self, view: &InventoryView) -> Vec<InventoryRow> {
        let mut held = Vec::with_capacity(MAX_ITEMS);
        let mut selected_num = 0;
        for (i, &count) in self.counts.iter().enumerate() {
            if i as i32 == view.selected {
                selected_num = held.len();
            }
            if count != 0 {
                held.push(i);
            }
        }

        // determine scroll point
        let num = held.len() as i32;
        let mut top = selected_num as i32 - DISPLAY_ITEMS as i32 / 2;
        if num - top < DISPLAY_ITEMS as i32 {
            top = num - DISPLAY_ITEMS as i32;
        }
        let top = top.max(0) as usize;

        held.iter()
            .skip(top)
            .take(DISPLAY_ITEMS)
            .map(|&item| {
                let name = view.item_names.get(item).map_or("", String::as_str);

                // search for a binding
                let bind = view
                    .bindings
                    .key_for(&format!("use {}", name))
                    .map(keynum_to_string)
                    .unwrap_or_default();

                let selected = item as i32 == view.selected;
                let mut text = format!("{:>6} {:3} {}", bind, self.counts[item], name).into_bytes();
                if !selected {
                    for c in text.iter_mut() {
                        *c |= 128;
                    }
                }
                InventoryRow { item, text, selected }
            })
            .collect()
    }

    pub fn draw_inventory<B: RenderBackend>(&self, r: &mut Renderer<B>, view: &InventoryView) {
        let scale = view.scale;
        let step = |n: f32| (n * scale) as i32;

        let mut x = (view.width - step(256.0)) / 2;
        let mut y = (view.height - step(240.0)) / 2;

        r.draw_pic_scaled(x, y + step(8.0), "inventory", scale);

        y += step(24.0);
        x += step(24.0);
        r.draw_string_scaled(x, y, "hotkey ### item", scale);
        r.draw_string_scaled(x, y + step(8.0), "------ --- ----", scale);
        y += step(16.0);

        let blink = (view.realtime * 10.0) as i32 & 1 != 0;
        for row in self.rows(view) {
            if row.selected && blink {
                // draw a blinky cursor by the selected item
                r.draw_char_scaled(x - step(8.0), y, CURSOR_CHAR, scale);
            }
            r.draw_bytes_scaled(x, y, &row.text, scale);
            y += step(8.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q2core_common::common::Console;
    use q2core_renderer::r_image::LoadedImage;
    use q2core_renderer::RecordingBackend;

    fn names() -> Vec<String> {
        (0..MAX_ITEMS).map(|i| format!("item{}", i)).collect()
    }

    fn view<'a>(names: &'a [String], keys: &'a KeyBindings, selected: i32) -> InventoryView<'a> {
        InventoryView {
            selected,
            item_names: names,
            bindings: keys,
            realtime: 0.0,
            scale: 1.0,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn test_parse_inventory() {
        let mut bytes = Vec::new();
        for i in 0..MAX_ITEMS as i16 {
            bytes.extend_from_slice(&(i * 2).to_le_bytes());
        }
        let mut inv = Inventory::new();
        inv.parse_inventory(&mut SizeBuf::from_bytes(&bytes));
        assert_eq!(inv.counts[0], 0);
        assert_eq!(inv.counts[10], 20);
        assert_eq!(inv.counts[MAX_ITEMS - 1], (MAX_ITEMS as i32 - 1) * 2);

        // a short message leaves -1 in the missing slots
        inv.parse_inventory(&mut SizeBuf::from_bytes(&[5, 0]));
        assert_eq!(inv.counts[0], 5);
        assert_eq!(inv.counts[1], -1);
    }

    #[test]
    fn test_row_format_hotkey_and_high_bit() {
        let names = names();
        let mut keys = KeyBindings::new();
        keys.set_binding('q' as i32, "USE item3");
        let mut inv = Inventory::new();
        inv.counts[3] = 7;
        inv.counts[9] = 120;

        let rows = inv.rows(&view(&names, &keys, 9));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].item, 3);
        assert!(!rows[0].selected);
        let plain: Vec<u8> = rows[0].text.iter().map(|c| c & 127).collect();
        assert_eq!(plain, b"     q   7 item3");
        assert!(rows[0].text.iter().all(|c| c & 128 != 0));

        assert!(rows[1].selected);
        assert_eq!(rows[1].text, b"       120 item9");
    }

    #[test]
    fn test_scroll_keeps_selection_in_view() {
        let names = names();
        let keys = KeyBindings::new();
        let mut inv = Inventory::new();
        for i in 0..40 {
            inv.counts[i] = 1;
        }

        let rows = inv.rows(&view(&names, &keys, 20));
        assert_eq!(rows.len(), DISPLAY_ITEMS);
        assert_eq!(rows[0].item, 12);
        assert!(rows[8].selected);

        // near the end the window stops at the last item
        let rows = inv.rows(&view(&names, &keys, 39));
        assert_eq!(rows[0].item, 23);
        assert_eq!(rows.last().map(|r| r.item), Some(39));

        let rows = inv.rows(&view(&names, &keys, 2));
        assert_eq!(rows[0].item, 0);
    }

    #[test]
    fn test_draw_inventory() {
        let con = Console::capturing();
        let mut cmd = q2core_common::cmd::CmdContext::with_console(con.clone());
        let mut r = Renderer::new(RecordingBackend::new(), con);
        r.set_mode(640, 480);
        let palette = vec![0u8; 768];
        r.init(&mut cmd, Some(&palette)).unwrap();
        r.set_image_loader(Box::new(|name: &str| {
            (name == "pics/inventory.pcx").then(|| LoadedImage {
                width: 256,
                height: 192,
                rgba: vec![0; 256 * 192 * 4],
            })
        }));
        r.backend.take_calls();

        let names = names();
        let keys = KeyBindings::new();
        let mut inv = Inventory::new();
        inv.counts[1] = 1;
        let mut v = view(&names, &keys, 1);
        v.realtime = 0.15;
        inv.draw_inventory(&mut r, &v);

        let draws = r.backend.draws();
        // background pic first, at the centred origin plus 8
        assert_eq!(draws[0].1[0].xyz, [192.0, 128.0, 0.0]);
        // cursor to the left of the first row
        let cursor = draws
            .iter()
            .find(|(_, q)| q[0].xyz == [208.0, 160.0, 0.0])
            .map(|(_, q)| q[0].st);
        assert_eq!(cursor, Some([15.0 * 0.0625, 0.0]));
    }
}
